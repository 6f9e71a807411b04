// Generates Swift/Kotlin bindings for diag_core:
//   cargo run -p uniffi-bindgen -- generate --library <libdiag_core> --language kotlin --out-dir <dir>
fn main() {
    uniffi::uniffi_bindgen_main()
}
