//! Injects Wi-Fi credentials and collector URLs from `.env` at compile time.

const KEYS: [&str; 6] = [
    "WIFI_SSID",
    "WIFI_PASSWORD",
    "WIFI_SSID_2",
    "WIFI_PASSWORD_2",
    "COLLECTOR_URL",
    "COLLECTOR_FALLBACK_URL",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    // Without a .env file the values may still come from the environment.
    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=no .env loaded ({e}), using process environment");
    }

    for key in KEYS {
        let value = std::env::var(key).unwrap_or_default();
        println!("cargo:rerun-if-env-changed={key}");
        println!("cargo:rustc-env={key}={value}");
    }
}
