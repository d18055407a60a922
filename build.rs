//! Collects build information for inclusion in run metadata.
fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");
}
