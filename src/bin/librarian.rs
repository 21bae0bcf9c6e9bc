//! E-book librarian firmware binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin librarian` (add `-- --setup` to force
//!   configuration mode; press Enter to simulate the button)
//! - **ESP32**: `cargo espflash flash --bin librarian --features esp32 --release`
//!
//! ## Modes
//!
//! - **Library**: the saved network was joined. Serves the library UI and API
//!   on port 80 and watches the reader mount and the button.
//! - **Configuration**: no usable network. Starts the access point, the setup
//!   portal, captive DNS and (on ESP32) BLE provisioning, then waits for a
//!   credential and restarts.

use ebook_librarian::config::Settings;
use ebook_librarian::indicator::{run_indicator, Indicator};
use ebook_librarian::input::handle_press;
use ebook_librarian::portal::{CaptiveDns, SetupPortal};
use ebook_librarian::provisioning::{BootOutcome, ProvisioningController, Restart};
use ebook_librarian::transfer::TransferEngine;
use ebook_librarian::volumes::{watch_mounts, Volumes};
use ebook_librarian::web::{Handler, HttpServer, LibraryApi};
use log::{error, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "esp32")]
use ebook_librarian::storage::NvsCredentialStore as Store;
#[cfg(not(feature = "esp32"))]
use ebook_librarian::storage::FileCredentialStore as Store;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Restart through the SoC reset.
#[cfg(feature = "esp32")]
struct DeviceRestart;

#[cfg(feature = "esp32")]
impl Restart for DeviceRestart {
    fn restart(&self) {
        info!("Restarting");
        esp_idf_hal::reset::restart();
    }
}

/// Host "restart": exit and let the supervisor start us again.
#[cfg(not(feature = "esp32"))]
struct DeviceRestart;

#[cfg(not(feature = "esp32"))]
impl Restart for DeviceRestart {
    fn restart(&self) {
        info!("Restart requested, exiting");
        std::process::exit(0);
    }
}

/// Hardware owned by the binary.
#[cfg(feature = "esp32")]
struct Board {
    store: Store,
    wifi: ebook_librarian::wifi::EspWifiDriver,
    strip: ebook_librarian::indicator::Ws2812Strip,
    button: ebook_librarian::input::GpioButton,
}

#[cfg(feature = "esp32")]
fn board_init(_settings: &Settings) -> Result<Board, esp_idf_sys::EspError> {
    use esp_idf_hal::gpio::IOPin;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let store = Store::open(nvs.clone())?;
    let wifi = ebook_librarian::wifi::EspWifiDriver::new(peripherals.modem, sysloop, Some(nvs))?;
    let strip =
        ebook_librarian::indicator::Ws2812Strip::new(peripherals.rmt.channel0, peripherals.pins.gpio4)?;
    let button = ebook_librarian::input::GpioButton::new(peripherals.pins.gpio0.downgrade())?;

    Ok(Board {
        store,
        wifi,
        strip,
        button,
    })
}

/// Host stand-ins.
#[cfg(not(feature = "esp32"))]
struct Board {
    store: Store,
    wifi: ebook_librarian::wifi::HostWifi,
    strip: ebook_librarian::indicator::LogStrip,
}

#[cfg(not(feature = "esp32"))]
fn board_init(settings: &Settings) -> std::io::Result<Board> {
    let store = match &settings.credential_path {
        Some(path) => Store::new(path),
        None => Store::open_default()?,
    };
    info!("Credential file: {:?}", store.path());

    Ok(Board {
        store,
        wifi: ebook_librarian::wifi::HostWifi::new(),
        strip: ebook_librarian::indicator::LogStrip::new(),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    platform_init();

    info!("=== E-book librarian starting ===");

    #[cfg(feature = "esp32")]
    info!("Platform: ESP32");
    #[cfg(not(feature = "esp32"))]
    info!("Platform: Host");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid settings: {}", e);
            return;
        }
    };

    let board = match board_init(&settings) {
        Ok(board) => board,
        Err(e) => {
            error!("Hardware initialization failed: {:?}", e);
            return;
        }
    };

    let cancel = CancellationToken::new();
    let indicator = Indicator::new();
    let indicator_task = tokio::spawn(run_indicator(
        indicator.clone(),
        board.strip,
        cancel.clone(),
    ));

    // Holding the button during boot forces configuration mode
    #[cfg(feature = "esp32")]
    let force_config = {
        use ebook_librarian::input::EdgeInput;
        board.button.is_pressed()
    };
    #[cfg(not(feature = "esp32"))]
    let force_config = std::env::args().any(|arg| arg == "--setup");

    let controller = Arc::new(ProvisioningController::new(
        board.store,
        indicator.clone(),
        Arc::new(DeviceRestart),
        settings.provisioning.clone(),
    ));

    // The join blocks for up to the join timeout
    let boot_controller = controller.clone();
    let mut wifi = board.wifi;
    let booted = tokio::task::spawn_blocking(move || {
        let outcome = boot_controller.boot(&mut wifi, force_config);
        (outcome, wifi)
    })
    .await;

    let (outcome, _wifi) = match booted {
        Ok((Ok(outcome), wifi)) => (outcome, wifi),
        Ok((Err(e), _)) => {
            error!("Boot failed: {}", e);
            indicator.fault();
            return;
        }
        Err(e) => {
            error!("Boot task failed: {}", e);
            indicator.fault();
            return;
        }
    };

    // Keep the surfaces alive until shutdown
    let mut _server: Option<HttpServer> = None;
    let mut _dns: Option<CaptiveDns> = None;
    #[cfg(feature = "esp32")]
    let mut _ble: Option<ebook_librarian::config::ProvisioningService> = None;

    match outcome {
        BootOutcome::Connected { ip } => {
            info!("Library mode on http://{}:{}/", ip, settings.http_port);

            let volumes = Arc::new(Volumes::new(&settings.sd_root));
            let engine = TransferEngine::new(volumes.clone(), indicator.clone());
            let api: Arc<dyn Handler> = Arc::new(LibraryApi::new(
                volumes.clone(),
                engine.clone(),
                settings.web_root.clone(),
            ));
            _server = start_http(settings.http_port, settings.http_workers, api);

            tokio::spawn(watch_mounts(
                volumes,
                settings.usb_root.clone(),
                indicator.clone(),
                settings.mount_poll_interval,
                cancel.clone(),
            ));

            let press_engine = engine.clone();
            let press_indicator = indicator.clone();
            let on_press = move || {
                let outcome = handle_press(&press_engine, &press_indicator);
                info!("Button press: {:?}", outcome);
            };

            #[cfg(feature = "esp32")]
            tokio::spawn(ebook_librarian::input::watch_button(
                board.button,
                on_press,
                cancel.clone(),
            ));
            #[cfg(not(feature = "esp32"))]
            spawn_stdin_button(on_press, cancel.clone());
        }
        BootOutcome::ConfigMode { reason, ap_ip } => {
            info!("Configuration mode ({})", reason);

            let portal: Arc<dyn Handler> = Arc::new(SetupPortal::new(controller.clone()));
            _server = start_http(settings.http_port, settings.http_workers, portal);

            match ap_ip {
                Some(IpAddr::V4(ip)) if !ip.is_unspecified() => {
                    let bind = SocketAddr::new(IpAddr::V4(ip), ebook_librarian::portal::dns::DNS_PORT);
                    match CaptiveDns::start(bind, ip) {
                        Ok(dns) => _dns = Some(dns),
                        Err(e) => warn!("Captive DNS unavailable: {}", e),
                    }
                }
                Some(ip) => info!("No captive DNS for {}", ip),
                None => warn!("Access point down, only BLE provisioning is available"),
            }

            #[cfg(feature = "esp32")]
            {
                let ble_controller = controller.clone();
                let submit = Arc::new(move |ssid: &str, secret: &str| {
                    ble_controller
                        .submit_credential(ssid, secret)
                        .map_err(|e| e.to_string())
                });
                match ebook_librarian::config::ProvisioningService::start(submit) {
                    Ok(service) => _ble = Some(service),
                    Err(e) => error!("BLE provisioning unavailable: {:?}", e),
                }
            }

            #[cfg(not(feature = "esp32"))]
            info!("Open the setup portal and submit a network to continue");
        }
    }

    // Wait for shutdown
    #[cfg(not(feature = "esp32"))]
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            cancel.cancel();
        }
        result = indicator_task => {
            if let Err(e) = result {
                error!("Indicator task error: {}", e);
            }
        }
    }

    #[cfg(feature = "esp32")]
    {
        if let Err(e) = indicator_task.await {
            error!("Indicator task error: {}", e);
        }
    }

    info!("Shutdown complete");
}

fn start_http(port: u16, workers: usize, handler: Arc<dyn Handler>) -> Option<HttpServer> {
    match HttpServer::start(None, port, workers, handler) {
        Ok(server) => Some(server),
        Err(e) => {
            error!("HTTP server failed to start on port {}: {}", port, e);
            None
        }
    }
}

/// Host button: each line on stdin is one press.
#[cfg(not(feature = "esp32"))]
fn spawn_stdin_button<F>(mut on_press: F, cancel: CancellationToken)
where
    F: FnMut() + Send + 'static,
{
    info!("Press Enter to simulate the button");
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        while !cancel.is_cancelled() {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => on_press(),
                Err(e) => {
                    warn!("stdin closed: {}", e);
                    break;
                }
            }
        }
    });
}
