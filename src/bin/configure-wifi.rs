//! Store a network credential without going through the setup portal.
//!
//! ESP32 (values baked in at compile time, written to NVS):
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo espflash flash --bin configure-wifi --features esp32
//!
//! Host (values read at run time, written to the credential file):
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo run --bin configure-wifi
//!   cargo run --bin configure-wifi -- --clear
//!
//! For open networks leave WIFI_PASSWORD empty.

use ebook_librarian::config::{ConfigError, Credential};

/// WiFi SSID - set via WIFI_SSID environment variable at compile time.
#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// WiFi password - set via WIFI_PASSWORD environment variable at compile time.
/// Empty string for open networks.
#[cfg(feature = "esp32")]
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

const USAGE: &str = "Usage:\n  \
    WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" configure-wifi\n\n\
    For open networks:\n  \
    WIFI_SSID=\"OpenNetwork\" WIFI_PASSWORD=\"\" configure-wifi";

/// Print error message and exit. On ESP32, pause first so the serial
/// monitor shows the output.
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    #[cfg(feature = "esp32")]
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

fn describe(error: &ConfigError) -> String {
    match error {
        ConfigError::SsidEmpty => "SSID cannot be empty".to_string(),
        ConfigError::SsidTooLong { len, max } => {
            format!("SSID too long ({} bytes, max {})", len, max)
        }
        ConfigError::SecretTooShort { len, min } => {
            format!("Password too short ({} bytes, min {} for WPA)", len, min)
        }
        ConfigError::SecretTooLong { len, max } => {
            format!("Password too long ({} bytes, max {})", len, max)
        }
        other => other.to_string(),
    }
}

fn build_credential(ssid: &str, password: &str) -> Credential {
    println!("SSID: {}", ssid);
    println!(
        "Password: {} ({} chars)",
        if password.is_empty() { "(none)" } else { "****" },
        password.len()
    );

    match Credential::new(ssid, password) {
        Ok(credential) => credential,
        Err(e) => halt_with_error(&format!("Error: {}", describe(&e))),
    }
}

#[cfg(feature = "esp32")]
fn main() {
    use ebook_librarian::storage::{CredentialStore, NvsCredentialStore};
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== WiFi Configuration Utility ===\n");

    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => halt_with_error(&format!(
            "Error: WIFI_SSID environment variable not set at compile time.\n\n{}",
            USAGE
        )),
    };
    let credential = build_credential(ssid, WIFI_PASSWORD.unwrap_or(""));

    let mut store = match EspDefaultNvsPartition::take().and_then(NvsCredentialStore::open) {
        Ok(store) => store,
        Err(e) => halt_with_error(&format!("Error initializing NVS: {:?}", e)),
    };
    if let Err(e) = store.save(&credential) {
        halt_with_error(&format!("Error saving to NVS: {}", e));
    }

    println!("\n=== WiFi configuration saved to NVS ===");
    println!("\nThe librarian joins this network on its next boot.");
    println!("\n=== Done - you can disconnect the device ===\n");

    // Brief pause to ensure serial output is visible, then exit cleanly
    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use ebook_librarian::storage::{CredentialStore, FileCredentialStore};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("\n=== WiFi Configuration Utility ===\n");

    let mut store = match std::env::var("LIBRARIAN_CREDENTIALS") {
        Ok(path) => FileCredentialStore::new(path),
        Err(_) => match FileCredentialStore::open_default() {
            Ok(store) => store,
            Err(e) => halt_with_error(&format!("Error locating credential file: {}", e)),
        },
    };

    if std::env::args().any(|arg| arg == "--clear") {
        if let Err(e) = store.clear() {
            halt_with_error(&format!("Error clearing {:?}: {}", store.path(), e));
        }
        println!("Credential removed from {:?}", store.path());
        return;
    }

    let ssid = match std::env::var("WIFI_SSID") {
        Ok(s) if !s.is_empty() => s,
        _ => halt_with_error(&format!(
            "Error: WIFI_SSID environment variable not set.\n\n{}",
            USAGE
        )),
    };
    let password = std::env::var("WIFI_PASSWORD").unwrap_or_default();
    let credential = build_credential(&ssid, &password);

    if let Err(e) = store.save(&credential) {
        halt_with_error(&format!("Error saving to {:?}: {}", store.path(), e));
    }
    println!("\n=== WiFi configuration saved to {:?} ===", store.path());
}
