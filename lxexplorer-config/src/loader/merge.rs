/// Recursively merge `overlay` into `base`.
///
/// Tables merge key by key; any other value in `overlay` replaces the one in
/// `base` wholesale.
pub fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    let (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) = (&mut *base, overlay)
    else {
        *base = overlay.clone();
        return;
    };

    for (key, value) in overlay_table {
        match base_table.get_mut(key) {
            Some(existing) => merge_toml_values(existing, value),
            None => {
                base_table.insert(key.clone(), value.clone());
            }
        }
    }
}
