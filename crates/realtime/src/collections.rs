//! Collection-Spiegel
//!
//! Haelt pro Collection eine Tabelle Dokument-ID -> Felder und wendet die
//! vom Server gesendeten Diffs (`added`, `changed`, `removed`) in
//! Empfangsreihenfolge an.
//!
//! Schreibzugriffe kommen ausschliesslich vom Verbindungs-Task. Leser
//! erhalten Kopien unter einem Read-Lock und sehen daher nie einen halb
//! angewendeten Diff.

use std::collections::HashMap;
use std::sync::Arc;

use bbbot_core::{CollectionEvent, DiffOp, Document};
use bbbot_protocol::Envelope;
use parking_lot::RwLock;

type Tabelle = HashMap<String, Document>;

/// Gespiegelte Collections einer Verbindung
#[derive(Debug, Clone, Default)]
pub struct CollectionStore {
    inner: Arc<RwLock<HashMap<String, Tabelle>>>,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kopie aller Dokumente einer Collection (leer wenn unbekannt)
    pub fn snapshot(&self, collection: &str) -> HashMap<String, Document> {
        self.inner
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Kopie eines einzelnen Dokuments
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .read()
            .get(collection)
            .and_then(|t| t.get(id))
            .cloned()
    }

    /// Namen aller Collections mit mindestens einem Dokument
    pub fn collections(&self) -> Vec<String> {
        self.inner
            .read()
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Wendet einen Diff an
    ///
    /// Gibt das resultierende Event zurueck, oder `None` wenn der Diff
    /// nichts veraendert hat (bzw. kein Diff war).
    pub(crate) fn apply_diff(&self, diff: Envelope) -> Option<CollectionEvent> {
        let mut collections = self.inner.write();
        match diff {
            Envelope::Added {
                collection,
                id,
                fields,
            } => {
                let tabelle = collections.entry(collection.clone()).or_default();
                let corrected = tabelle.insert(id.clone(), fields.clone()).is_some();
                if corrected {
                    tracing::warn!(
                        collection = %collection,
                        dokument = %id,
                        "added fuer vorhandenes Dokument – ueberschrieben"
                    );
                }
                Some(CollectionEvent {
                    collection,
                    op: DiffOp::Added,
                    document_id: id,
                    document: Some(fields),
                    corrected,
                })
            }
            Envelope::Changed {
                collection,
                id,
                fields,
                cleared,
            } => {
                let Some(dokument) = collections
                    .get_mut(&collection)
                    .and_then(|t| t.get_mut(&id))
                else {
                    tracing::debug!(
                        collection = %collection,
                        dokument = %id,
                        "changed fuer unbekanntes Dokument ignoriert"
                    );
                    return None;
                };
                for (feld, wert) in fields {
                    dokument.insert(feld, wert);
                }
                for feld in &cleared {
                    dokument.remove(feld);
                }
                Some(CollectionEvent {
                    collection,
                    op: DiffOp::Changed,
                    document_id: id,
                    document: Some(dokument.clone()),
                    corrected: false,
                })
            }
            Envelope::Removed { collection, id } => {
                let entfernt = collections
                    .get_mut(&collection)
                    .and_then(|t| t.remove(&id));
                match entfernt {
                    Some(_) => Some(CollectionEvent {
                        collection,
                        op: DiffOp::Removed,
                        document_id: id,
                        document: None,
                        corrected: false,
                    }),
                    None => {
                        tracing::debug!(
                            collection = %collection,
                            dokument = %id,
                            "removed fuer unbekanntes Dokument ignoriert"
                        );
                        None
                    }
                }
            }
            andere => {
                tracing::trace!(kind = andere.kind(), "Kein Collection-Diff");
                None
            }
        }
    }

    /// Verwirft alle gespiegelten Daten
    pub(crate) fn leeren(&self) {
        self.inner.write().clear();
    }
}
