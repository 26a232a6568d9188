//! Subscription-Registry
//!
//! Verfolgt alle aktiven Subscriptions einer Verbindung und deren
//! Bereitschaft. Gehoert ausschliesslich dem Verbindungs-Task.
//!
//! ## Lebenszyklus
//! ```text
//! sub gesendet -> Ausstehend --ready--> Bereit
//!                     |
//!                     +----nosub----> Gestoppt(Fehler)
//! ```
//! Explizites `unsub` oder der Abbau der Verbindung entfernt den Eintrag.

use std::collections::HashMap;

use bbbot_core::ServerError;
use tokio::sync::oneshot;

use crate::error::{RealtimeError, RealtimeResult};

/// Sender fuer einen Bereitschafts-Wartenden
pub type ReadySender = oneshot::Sender<RealtimeResult<()>>;

/// Zustand einer Subscription
#[derive(Debug, Clone, PartialEq)]
pub enum SubZustand {
    Ausstehend,
    Bereit,
    Gestoppt(ServerError),
}

#[derive(Debug)]
struct SubEintrag {
    name: String,
    params: Vec<serde_json::Value>,
    zustand: SubZustand,
    wartende: Vec<ReadySender>,
}

/// Aktive Subscriptions, indiziert nach Subscription-ID
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subs: HashMap<String, SubEintrag>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legt eine neue ausstehende Subscription an
    pub fn registrieren(&mut self, id: String, name: String, params: Vec<serde_json::Value>) {
        tracing::debug!(sub_id = %id, name = %name, "Subscription angelegt");
        self.subs.insert(
            id,
            SubEintrag {
                name,
                params,
                zustand: SubZustand::Ausstehend,
                wartende: Vec::new(),
            },
        );
    }

    /// Registriert einen Wartenden oder loest ihn sofort auf
    pub fn warten(&mut self, id: &str, sender: ReadySender) {
        let Some(eintrag) = self.subs.get_mut(id) else {
            let _ = sender.send(Err(RealtimeError::UnknownSubscription(id.to_string())));
            return;
        };
        match &eintrag.zustand {
            SubZustand::Bereit => {
                let _ = sender.send(Ok(()));
            }
            SubZustand::Gestoppt(fehler) => {
                let _ = sender.send(Err(RealtimeError::Server(fehler.clone())));
            }
            SubZustand::Ausstehend => eintrag.wartende.push(sender),
        }
    }

    /// Markiert eine Subscription als bereit (`ready`)
    pub fn bereit(&mut self, id: &str) {
        let Some(eintrag) = self.subs.get_mut(id) else {
            tracing::debug!(sub_id = %id, "ready fuer unbekannte Subscription");
            return;
        };
        eintrag.zustand = SubZustand::Bereit;
        for sender in eintrag.wartende.drain(..) {
            let _ = sender.send(Ok(()));
        }
        tracing::debug!(sub_id = %id, name = %eintrag.name, "Subscription bereit");
    }

    /// Markiert eine Subscription als gestoppt (`nosub`)
    ///
    /// Ohne Fehlerobjekt des Servers wird "subscription stopped" gemeldet.
    pub fn gestoppt(&mut self, id: &str, fehler: Option<ServerError>) {
        let Some(eintrag) = self.subs.get_mut(id) else {
            tracing::debug!(sub_id = %id, "nosub fuer nicht (mehr) verfolgte Subscription");
            return;
        };
        let fehler = fehler.unwrap_or_else(|| ServerError::neu("nosub", "subscription stopped"));
        tracing::warn!(sub_id = %id, name = %eintrag.name, fehler = %fehler, "Subscription vom Server gestoppt");
        for sender in eintrag.wartende.drain(..) {
            let _ = sender.send(Err(RealtimeError::Server(fehler.clone())));
        }
        eintrag.zustand = SubZustand::Gestoppt(fehler);
    }

    /// Entfernt eine Subscription (explizites `unsub`)
    ///
    /// Noch Wartende erhalten `UnknownSubscription`.
    pub fn entfernen(&mut self, id: &str) -> bool {
        match self.subs.remove(id) {
            Some(eintrag) => {
                for sender in eintrag.wartende {
                    let _ = sender.send(Err(RealtimeError::UnknownSubscription(id.to_string())));
                }
                true
            }
            None => false,
        }
    }

    /// Entfernt alle Subscriptions und loest alle Wartenden mit dem Fehler auf
    pub fn alle_abbrechen(&mut self, fehler: RealtimeError) {
        for (_, eintrag) in self.subs.drain() {
            for sender in eintrag.wartende {
                let _ = sender.send(Err(fehler.clone()));
            }
        }
    }

    /// Zustand einer Subscription
    #[cfg(test)]
    pub fn zustand(&self, id: &str) -> Option<&SubZustand> {
        self.subs.get(id).map(|e| &e.zustand)
    }

    /// Name und Parameter einer Subscription
    #[cfg(test)]
    pub fn details(&self, id: &str) -> Option<(&str, &[serde_json::Value])> {
        self.subs
            .get(id)
            .map(|e| (e.name.as_str(), e.params.as_slice()))
    }

    /// IDs aller verfolgten Subscriptions
    pub fn ids(&self) -> Vec<String> {
        self.subs.keys().cloned().collect()
    }
}
