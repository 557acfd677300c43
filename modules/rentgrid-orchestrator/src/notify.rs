//! A thin notifier-driving helper. Not part of the main `run()` flow: the
//! notifier is an external collaborator (spec.md Non-goals: "the web
//! dashboard / notifier / CLI framing ... remain out of scope"), but the
//! store's `mark_notified`/`mark_notification_failed` operations still need
//! something to call them during tests and from the orchestrator binary's
//! own CLI, so this module drives the `Notifier` trait the same way the
//! production notifier process would.

use std::sync::Arc;

use tracing::{info, warn};

use rentgrid_common::capability::Notifier;
use rentgrid_common::RentGridError;

use rentgrid_store::Store;

pub struct NotifyOutcome {
    pub sent: usize,
    pub failed: usize,
    pub skipped_no_analysis: usize,
}

/// Drains `get_properties_pending_notification`, sending each through
/// `notifier`. A permanent delivery failure marks the row `failed`
/// (terminal); any other error leaves it `pending` for the next run to
/// retry, matching the lifecycle diagram's "notifier permanent-fail" vs.
/// implicit transient-retry edges.
pub async fn notify_pending(store: &Store, notifier: &Arc<dyn Notifier>) -> anyhow::Result<NotifyOutcome> {
    let pending = store.get_properties_pending_notification().await?;

    let mut sent = 0;
    let mut failed = 0;
    let mut skipped_no_analysis = 0;

    for property in pending {
        let Some(analysis) = store.get_analysis(property.id).await? else {
            warn!(property_id = %property.id, "property pending notification has no analysis row; skipped");
            skipped_no_analysis += 1;
            continue;
        };

        match notifier.send_notification(&property, &analysis).await {
            Ok(()) => {
                store.mark_notified(property.id).await?;
                sent += 1;
            }
            Err(RentGridError::PermanentDeliveryFailure(msg)) => {
                warn!(property_id = %property.id, %msg, "notification delivery failed permanently");
                store.mark_notification_failed(property.id).await?;
                failed += 1;
            }
            Err(e) => {
                warn!(error = %e, property_id = %property.id, "notification failed transiently; left pending for retry");
            }
        }
    }

    info!(sent, failed, skipped_no_analysis, "notify stage complete");
    Ok(NotifyOutcome { sent, failed, skipped_no_analysis })
}
