//! Call-Registry – Zuordnung von Methodenaufrufen zu ihren Ergebnissen
//!
//! Wird ausschliesslich vom Verbindungs-Task besessen. Jeder offene Aufruf
//! haelt einen oneshot-Sender, der genau einmal aufgeloest wird: mit dem
//! Ergebnis, dem Serverfehler oder `ConnectionLost` beim Abbau.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::{RealtimeError, RealtimeResult};

/// Sender fuer das Ergebnis eines Methodenaufrufs
pub type CallSender = oneshot::Sender<RealtimeResult<serde_json::Value>>;

/// Offene Methodenaufrufe, indiziert nach Call-ID
#[derive(Debug, Default)]
pub struct CallRegistry {
    offen: HashMap<String, CallSender>,
    naechste_id: u64,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vergibt eine neue Call-ID und merkt sich den Sender
    ///
    /// IDs sind fortlaufende Dezimalzahlen und werden pro Verbindung nie
    /// wiederverwendet.
    pub fn anmelden(&mut self, sender: CallSender) -> String {
        self.naechste_id += 1;
        let id = self.naechste_id.to_string();
        self.offen.insert(id.clone(), sender);
        id
    }

    /// Loest einen offenen Aufruf auf und entfernt ihn
    ///
    /// Gibt false zurueck wenn die ID unbekannt ist.
    pub fn aufloesen(&mut self, id: &str, ergebnis: RealtimeResult<serde_json::Value>) -> bool {
        match self.offen.remove(id) {
            Some(sender) => {
                // Aufrufer hat evtl. aufgegeben – kein Fehler
                let _ = sender.send(ergebnis);
                true
            }
            None => {
                tracing::warn!(call_id = %id, "Ergebnis fuer unbekannten Call verworfen");
                false
            }
        }
    }

    /// Loest alle offenen Aufrufe mit demselben Fehler auf
    pub fn alle_abbrechen(&mut self, fehler: RealtimeError) {
        let anzahl = self.offen.len();
        for (_, sender) in self.offen.drain() {
            let _ = sender.send(Err(fehler.clone()));
        }
        if anzahl > 0 {
            tracing::debug!(anzahl, fehler = %fehler, "Offene Calls abgebrochen");
        }
    }

    /// Anzahl offener Aufrufe
    pub fn anzahl(&self) -> usize {
        self.offen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_sind_fortlaufend_und_eindeutig() {
        let mut reg = CallRegistry::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        assert_eq!(reg.anmelden(tx1), "1");
        assert_eq!(reg.anmelden(tx2), "2");
        assert_eq!(reg.anzahl(), 2);
    }

    #[tokio::test]
    async fn aufloesen_in_umgekehrter_reihenfolge() {
        let mut reg = CallRegistry::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let id1 = reg.anmelden(tx1);
        let id2 = reg.anmelden(tx2);

        assert!(reg.aufloesen(&id2, Ok(json!("zwei"))));
        assert!(reg.aufloesen(&id1, Ok(json!("eins"))));

        assert_eq!(rx1.await.unwrap().unwrap(), json!("eins"));
        assert_eq!(rx2.await.unwrap().unwrap(), json!("zwei"));
        assert_eq!(reg.anzahl(), 0);
    }

    #[test]
    fn unbekannte_id_wird_verworfen() {
        let mut reg = CallRegistry::new();
        assert!(!reg.aufloesen("99", Ok(serde_json::Value::Null)));
    }

    #[tokio::test]
    async fn doppeltes_ergebnis_loest_nur_einmal_auf() {
        let mut reg = CallRegistry::new();
        let (tx, rx) = oneshot::channel();
        let id = reg.anmelden(tx);
        assert!(reg.aufloesen(&id, Ok(json!(1))));
        assert!(!reg.aufloesen(&id, Ok(json!(2))));
        assert_eq!(rx.await.unwrap().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn alle_abbrechen_liefert_connection_lost() {
        let mut reg = CallRegistry::new();
        let mut empfaenger = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel();
            reg.anmelden(tx);
            empfaenger.push(rx);
        }
        reg.alle_abbrechen(RealtimeError::ConnectionLost);
        assert_eq!(reg.anzahl(), 0);
        for rx in empfaenger {
            assert!(matches!(rx.await.unwrap(), Err(RealtimeError::ConnectionLost)));
        }
    }
}
