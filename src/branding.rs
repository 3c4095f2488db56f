//! Merchant branding resolution for receipts.
//!
//! Order: the seller's saved receipt settings, then settings derived from
//! their profile (saved back best-effort), then built-in defaults. A failed
//! lookup resolves to nothing so callers can fall back to the local cache.

use tracing::{debug, warn};

use crate::db::OfflineStore;
use crate::error::PosError;
use crate::receipt_renderer::{ReceiptSettings, DEFAULT_BUSINESS_NAME};
use crate::remote::{Profile, RemoteStore};

const BRANDING_CATEGORY: &str = "receipt_branding";

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Receipt settings derived from a seller profile.
pub fn settings_from_profile(profile: &Profile) -> ReceiptSettings {
    ReceiptSettings {
        business_name: Some(
            non_empty(&profile.full_name)
                .or_else(|| non_empty(&profile.username))
                .unwrap_or_else(|| DEFAULT_BUSINESS_NAME.to_string()),
        ),
        logo_url: non_empty(&profile.avatar_url),
        phone: non_empty(&profile.contact_number),
        ..ReceiptSettings::default()
    }
}

/// Branding as the backend currently defines it. `None` when a lookup
/// failed, so the caller can keep whatever it had cached.
pub async fn resolve_branding(remote: &dyn RemoteStore, seller_id: &str) -> Option<ReceiptSettings> {
    match remote.get_receipt_settings(seller_id).await {
        Ok(Some(settings)) => return Some(settings),
        Ok(None) => debug!(seller_id, "No receipt settings saved; deriving from profile"),
        Err(e) => {
            warn!(seller_id, error = %e, "Receipt settings lookup failed");
            return None;
        }
    }

    let profile = match remote.get_profile(seller_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            debug!(seller_id, "No profile found; using default branding");
            return Some(ReceiptSettings::default());
        }
        Err(e) => {
            warn!(seller_id, error = %e, "Profile lookup failed");
            return None;
        }
    };

    let settings = settings_from_profile(&profile);
    if let Err(e) = remote.upsert_receipt_settings(seller_id, &settings).await {
        warn!(seller_id, error = %e, "Could not save derived receipt settings");
    }
    Some(settings)
}

/// Last branding resolved online, so offline receipts keep the merchant's look.
pub fn cached_branding(store: &OfflineStore, seller_id: &str) -> Option<ReceiptSettings> {
    let raw = match store.get_setting(BRANDING_CATEGORY, seller_id) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(seller_id, error = %e, "Could not read cached branding");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!(seller_id, error = %e, "Ignoring unreadable cached branding");
            None
        }
    }
}

pub fn cache_branding(store: &OfflineStore, seller_id: &str, settings: &ReceiptSettings) {
    let result = serde_json::to_string(settings)
        .map_err(PosError::from)
        .and_then(|raw| store.set_setting(BRANDING_CATEGORY, seller_id, &raw));
    if let Err(e) = result {
        warn!(seller_id, error = %e, "Could not cache branding");
    }
}
