fn main() {
    // No-op for host test builds; exports the ESP-IDF link environment
    // when the espidf feature pulls in esp-idf-sys.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
