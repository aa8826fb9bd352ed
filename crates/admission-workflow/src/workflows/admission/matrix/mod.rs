//! Authority matrix: the declarative `(stage, status)` table consulted by every manual and
//! automatic transition.
//!
//! The table is data only. Both the built-in [`AuthorityMatrix::standard`] table and JSON
//! configuration go through [`AuthorityMatrix::from_entries`], so a malformed table is
//! rejected at startup rather than at transition time.

mod standard;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::domain::{ActorRole, ApplicationStatus, DocumentTag, Stage, StageStatus};
use super::triggers::TriggerKind;

/// Documents that must be approved before an edge may be taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRequirement {
    #[default]
    None,
    /// Every tag in the application's `documents_required`.
    Application,
    Tags(BTreeSet<DocumentTag>),
}

/// Provenance field written when an entry is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceStamp {
    Approved,
    Released,
}

/// One outgoing edge of a matrix entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub to: StageStatus,
    /// Overrides the entry's responsible actor for this edge only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorRole>,
    #[serde(default)]
    pub requires_reason: bool,
    #[serde(default)]
    pub documents: DocumentRequirement,
}

impl TransitionRule {
    pub fn new(stage: Stage, status: ApplicationStatus) -> Self {
        Self {
            to: StageStatus::new(stage, status),
            actor: None,
            requires_reason: false,
            documents: DocumentRequirement::None,
        }
    }

    pub fn by(mut self, actor: ActorRole) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_reason(mut self) -> Self {
        self.requires_reason = true;
        self
    }

    pub fn with_documents(mut self, documents: DocumentRequirement) -> Self {
        self.documents = documents;
        self
    }
}

fn default_cancellable() -> bool {
    true
}

/// Matrix row for a single `(stage, status)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    #[serde(flatten)]
    pub key: StageStatus,
    pub next_actor: ActorRole,
    pub action: String,
    #[serde(default)]
    pub transitions: Vec<TransitionRule>,
    #[serde(default)]
    pub terminal: bool,
    #[serde(default = "default_cancellable")]
    pub cancellable: bool,
    #[serde(default)]
    pub notify: Vec<ActorRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_trigger: Option<TriggerKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamps: Option<ProvenanceStamp>,
}

impl MatrixEntry {
    pub fn new(
        stage: Stage,
        status: ApplicationStatus,
        next_actor: ActorRole,
        action: impl Into<String>,
    ) -> Self {
        Self {
            key: StageStatus::new(stage, status),
            next_actor,
            action: action.into(),
            transitions: Vec::new(),
            terminal: false,
            cancellable: true,
            notify: vec![next_actor],
            auto_trigger: None,
            stamps: None,
        }
    }

    pub fn to(mut self, rule: TransitionRule) -> Self {
        self.transitions.push(rule);
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn not_cancellable(mut self) -> Self {
        self.cancellable = false;
        self
    }

    pub fn notify(mut self, actors: &[ActorRole]) -> Self {
        for actor in actors {
            if !self.notify.contains(actor) {
                self.notify.push(*actor);
            }
        }
        self
    }

    pub fn auto_trigger(mut self, trigger: TriggerKind) -> Self {
        self.auto_trigger = Some(trigger);
        self
    }

    pub fn stamps(mut self, stamp: ProvenanceStamp) -> Self {
        self.stamps = Some(stamp);
        self
    }

    /// Edge leading to `status`. Targets are unique per entry, so the literal is enough.
    pub fn edge(&self, status: ApplicationStatus) -> Option<&TransitionRule> {
        self.transitions.iter().find(|rule| rule.to.status == status)
    }

    pub fn authorized_actor(&self, rule: &TransitionRule) -> ActorRole {
        rule.actor.unwrap_or(self.next_actor)
    }
}

/// Configuration errors raised while loading the matrix.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("failed to read authority matrix from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("authority matrix is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("authority matrix has no entries")]
    Empty,
    #[error("duplicate authority matrix entry for {0}")]
    DuplicateEntry(StageStatus),
    #[error("status marker {0} cannot appear in the authority matrix")]
    ReservedStatus(StageStatus),
    #[error("entry {from} points to {to}, which has no matrix entry")]
    UnknownTarget { from: StageStatus, to: StageStatus },
    #[error("entry {from} lists more than one edge to status {status}")]
    AmbiguousTarget {
        from: StageStatus,
        status: ApplicationStatus,
    },
    #[error("entry {0} names System as next actor; System never waits on itself")]
    SystemAsNextActor(StageStatus),
    #[error("entry {from} declares auto trigger {trigger:?} but has no edge to {target}")]
    TriggerWithoutEdge {
        from: StageStatus,
        trigger: TriggerKind,
        target: StageStatus,
    },
    #[error("edge {from} -> {to} requires an empty document tag list")]
    EmptyDocumentList { from: StageStatus, to: StageStatus },
}

#[derive(Deserialize)]
struct MatrixDocument {
    entries: Vec<MatrixEntry>,
}

#[derive(Serialize)]
struct MatrixDocumentRef<'a> {
    entries: Vec<&'a MatrixEntry>,
}

/// Immutable, validated authority matrix.
#[derive(Debug, Clone)]
pub struct AuthorityMatrix {
    entries: BTreeMap<StageStatus, MatrixEntry>,
}

impl AuthorityMatrix {
    /// Built-in admission table.
    pub fn standard() -> Result<Self, MatrixError> {
        Self::from_entries(standard::standard_entries())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| MatrixError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, MatrixError> {
        let document: MatrixDocument = serde_json::from_str(raw)?;
        Self::from_entries(document.entries)
    }

    pub fn to_json_pretty(&self) -> Result<String, MatrixError> {
        let document = MatrixDocumentRef {
            entries: self.entries.values().collect(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    pub fn from_entries(entries: Vec<MatrixEntry>) -> Result<Self, MatrixError> {
        if entries.is_empty() {
            return Err(MatrixError::Empty);
        }

        let mut table = BTreeMap::new();
        for entry in entries {
            if entry.key.status.is_marker() {
                return Err(MatrixError::ReservedStatus(entry.key));
            }
            if entry.next_actor == ActorRole::System {
                return Err(MatrixError::SystemAsNextActor(entry.key));
            }
            let key = entry.key;
            if table.insert(key, entry).is_some() {
                return Err(MatrixError::DuplicateEntry(key));
            }
        }

        for entry in table.values() {
            validate_edges(entry, &table)?;
        }

        Ok(Self { entries: table })
    }

    pub fn entry(&self, key: StageStatus) -> Option<&MatrixEntry> {
        self.entries.get(&key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &MatrixEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statuses defined for `stage`, in declaration-independent order.
    pub fn vocabulary(&self, stage: Stage) -> Vec<ApplicationStatus> {
        self.entries
            .keys()
            .filter(|key| key.stage == stage)
            .map(|key| key.status)
            .collect()
    }
}

fn validate_edges(
    entry: &MatrixEntry,
    table: &BTreeMap<StageStatus, MatrixEntry>,
) -> Result<(), MatrixError> {
    let mut seen = BTreeSet::new();
    for rule in &entry.transitions {
        if rule.to.status.is_marker() {
            return Err(MatrixError::ReservedStatus(rule.to));
        }
        if !table.contains_key(&rule.to) {
            return Err(MatrixError::UnknownTarget {
                from: entry.key,
                to: rule.to,
            });
        }
        if !seen.insert(rule.to.status) {
            return Err(MatrixError::AmbiguousTarget {
                from: entry.key,
                status: rule.to.status,
            });
        }
        if let DocumentRequirement::Tags(tags) = &rule.documents {
            if tags.is_empty() {
                return Err(MatrixError::EmptyDocumentList {
                    from: entry.key,
                    to: rule.to,
                });
            }
        }
    }

    if let Some(trigger) = entry.auto_trigger {
        let target = trigger.target();
        if entry.edge(target.status).map(|rule| rule.to) != Some(target) {
            return Err(MatrixError::TriggerWithoutEdge {
                from: entry.key,
                trigger,
                target,
            });
        }
    }

    Ok(())
}
