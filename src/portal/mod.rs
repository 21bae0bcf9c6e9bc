//! Configuration-mode setup portal.
//!
//! Serves the setup form to anyone joined to the configuration access point
//! and forwards submissions to the provisioning controller. Every other path
//! redirects to the form, which together with [`dns::CaptiveDns`] makes
//! phones and laptops pop up the portal on their own.

pub mod dns;

pub use dns::CaptiveDns;

use crate::provisioning::{ProvisioningController, SubmitError};
use crate::storage::CredentialStore;
use crate::web::{form_value, Handler, HttpRequest, Reply};
use log::{info, warn};
use std::sync::Arc;
use tiny_http::Method;

const SETUP_HTML: &str = include_str!("../../assets/setup.html");

const SAVED_HTML: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>Saved</title></head><body><h1>Network saved</h1>\
<p>The library box is restarting and will join your network.</p></body></html>";

/// Handler for configuration mode.
pub struct SetupPortal<S: CredentialStore> {
    controller: Arc<ProvisioningController<S>>,
}

impl<S: CredentialStore> SetupPortal<S> {
    pub fn new(controller: Arc<ProvisioningController<S>>) -> Self {
        Self { controller }
    }

    fn save_credentials(&self, request: &HttpRequest) -> Reply {
        let body = String::from_utf8_lossy(&request.body);
        let ssid = form_value(&body, "ssid").unwrap_or_default();
        let password = form_value(&body, "password").unwrap_or_default();

        match self.controller.submit_credential(&ssid, &password) {
            Ok(()) => {
                info!("Portal saved credential for '{}'", ssid);
                Reply::html(200, SAVED_HTML)
            }
            Err(SubmitError::Invalid(e)) => {
                warn!("Portal submission rejected: {}", e);
                Reply::text(400, e.to_string())
            }
            Err(e @ SubmitError::Store(_)) => Reply::text(500, e.to_string()),
            Err(e @ (SubmitError::RestartPending | SubmitError::NotInConfigMode)) => {
                Reply::text(409, e.to_string())
            }
        }
    }
}

impl<S: CredentialStore> Handler for SetupPortal<S> {
    fn handle(&self, request: &HttpRequest) -> Reply {
        match (&request.method, request.path.as_str()) {
            (Method::Get, "/") => Reply::html(200, SETUP_HTML),
            (Method::Post, "/save-credentials") => self.save_credentials(request),
            _ => Reply::redirect("/"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisioningConfig;
    use crate::indicator::{Indicator, IndicatorState};
    use crate::provisioning::{BootOutcome, ProvisioningState, Restart};
    use crate::config::{PendingCredential, ProvisionStatus};
    use crate::storage::{FileCredentialStore, MemoryCredentialStore};
    use crate::wifi::HostWifi;
    use std::env;
    use std::fs;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingRestart(AtomicUsize);

    impl Restart for CountingRestart {
        fn restart(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_credential_path() -> std::path::PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        env::temp_dir().join(format!(
            "librarian-portal-{}-{}.json",
            std::process::id(),
            id
        ))
    }

    fn portal_with<S: CredentialStore>(store: S) -> (SetupPortal<S>, Arc<ProvisioningController<S>>) {
        let config = ProvisioningConfig {
            restart_delay: Duration::from_millis(10),
            ..ProvisioningConfig::default()
        };
        let indicator = Indicator::new();
        let controller = Arc::new(ProvisioningController::new(
            store,
            indicator.clone(),
            Arc::new(CountingRestart::default()),
            config,
        ));
        let outcome = controller.boot(&mut HostWifi::new(), false).unwrap();
        assert!(matches!(outcome, BootOutcome::ConfigMode { .. }));
        assert_eq!(indicator.snapshot(), IndicatorState::ConfigurationMode);
        (SetupPortal::new(controller.clone()), controller)
    }

    #[test]
    fn test_empty_store_redirects_everything() {
        let (portal, _) = portal_with(MemoryCredentialStore::new());

        let reply = portal.handle(&HttpRequest::get("/anything"));
        assert_eq!(reply.status, 302);
        assert_eq!(reply.header("Location"), Some("/"));

        let reply = portal.handle(&HttpRequest::get("/generate_204"));
        assert_eq!(reply.status, 302);

        let reply = portal.handle(&HttpRequest::post("/", "x=1"));
        assert_eq!(reply.status, 302);
    }

    #[test]
    fn test_setup_form() {
        let (portal, _) = portal_with(MemoryCredentialStore::new());

        let reply = portal.handle(&HttpRequest::get("/"));
        assert_eq!(reply.status, 200);
        assert!(reply.body_text().contains("/save-credentials"));
    }

    #[test]
    fn test_save_credentials() {
        let (portal, controller) = portal_with(MemoryCredentialStore::new());

        let reply = portal.handle(&HttpRequest::post(
            "/save-credentials",
            "ssid=Reading+Room&password=turn%20the%20page",
        ));
        assert_eq!(reply.status, 200);
        assert!(reply.body_text().contains("restarting"));
        assert_eq!(controller.state(), ProvisioningState::AwaitingRestart);

        // A second submission does not restart twice
        let again = portal.handle(&HttpRequest::post(
            "/save-credentials",
            "ssid=Other&password=12345678",
        ));
        assert_eq!(again.status, 409);
    }

    #[test]
    fn test_invalid_submission_stays_in_config_mode() {
        let (portal, controller) = portal_with(MemoryCredentialStore::new());

        let reply = portal.handle(&HttpRequest::post("/save-credentials", "ssid=&password=x"));
        assert_eq!(reply.status, 400);

        let reply = portal.handle(&HttpRequest::post(
            "/save-credentials",
            "ssid=Net&password=short",
        ));
        assert_eq!(reply.status, 400);
        assert_eq!(controller.state(), ProvisioningState::ConfigMode);
    }

    #[test]
    fn test_store_failure_is_500() {
        let (portal, controller) = portal_with(MemoryCredentialStore::failing());

        let reply = portal.handle(&HttpRequest::post(
            "/save-credentials",
            "ssid=Net&password=12345678",
        ));
        assert_eq!(reply.status, 500);
        assert_eq!(controller.state(), ProvisioningState::ConfigMode);
    }

    #[test]
    fn test_portal_and_ble_store_the_same_ssid() {
        let portal_path = temp_credential_path();
        let ble_path = temp_credential_path();

        let (portal, _) = portal_with(FileCredentialStore::new(&portal_path));
        let reply = portal.handle(&HttpRequest::post(
            "/save-credentials",
            "ssid=+Attic+&password=bookworms%21",
        ));
        assert_eq!(reply.status, 200);

        let (_, controller) = portal_with(FileCredentialStore::new(&ble_path));
        let pending = PendingCredential::new();
        pending.set_ssid(b" Attic ").unwrap();
        pending.set_secret(b"bookworms!").unwrap();
        let status = pending.commit(b"save", |ssid, secret| controller.submit_credential(ssid, secret));
        assert_eq!(status, ProvisionStatus::Saved);

        let from_portal = FileCredentialStore::new(&portal_path).load().unwrap();
        let from_ble = FileCredentialStore::new(&ble_path).load().unwrap();
        assert_eq!(from_portal.ssid, "Attic");
        assert_eq!(from_portal, from_ble);

        let _ = fs::remove_file(&portal_path);
        let _ = fs::remove_file(&ble_path);
    }
}
