//! Cross-timeframe propagation.
//!
//! Copies whole sections of one (timeframe, model) node over the same model's
//! node in other timeframes. The overwrite is destructive, so it is split in
//! two steps: a [`PushPlan`] describes it, and only the [`ConfirmedPush`]
//! obtained from [`PushPlan::confirm`] can apply it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

use crate::domain::{ConfigDocument, ModelType, Timeframe};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("select at least one destination timeframe and one section")]
    NothingSelected,

    #[error("destination {0} is the source timeframe")]
    DestinationIsSource(Timeframe),

    #[error("no {model} configuration in timeframe {timeframe}")]
    UnknownSource {
        timeframe: Timeframe,
        model: ModelType,
    },

    #[error("unknown section '{0}' (expected hyperparameters, features or architecture)")]
    UnknownSection(String),
}

/// A copyable part of a model node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Hyperparameters,
    Features,
    Architecture,
}

impl Section {
    pub const ALL: [Section; 3] = [
        Section::Hyperparameters,
        Section::Features,
        Section::Architecture,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Section::Hyperparameters => "hyperparameters",
            Section::Features => "features",
            Section::Architecture => "architecture",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Section {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hyperparameters" => Ok(Section::Hyperparameters),
            "features" => Ok(Section::Features),
            "architecture" | "model" => Ok(Section::Architecture),
            other => Err(PushError::UnknownSection(other.to_string())),
        }
    }
}

/// An unconfirmed push. Holds a single model type, so pushes never cross models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPlan {
    source: Timeframe,
    model: ModelType,
    destinations: Vec<Timeframe>,
    sections: Vec<Section>,
}

impl PushPlan {
    /// Duplicate destinations and sections are collapsed, first occurrence wins.
    pub fn new(
        source: Timeframe,
        model: ModelType,
        destinations: impl IntoIterator<Item = Timeframe>,
        sections: impl IntoIterator<Item = Section>,
    ) -> Result<Self, PushError> {
        let destinations = dedup(destinations);
        let sections = dedup(sections);
        if destinations.is_empty() || sections.is_empty() {
            return Err(PushError::NothingSelected);
        }
        if let Some(tf) = destinations.iter().find(|tf| **tf == source) {
            return Err(PushError::DestinationIsSource(tf.clone()));
        }
        Ok(Self {
            source,
            model,
            destinations,
            sections,
        })
    }

    pub fn source(&self) -> &Timeframe {
        &self.source
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    pub fn destinations(&self) -> &[Timeframe] {
        &self.destinations
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn confirmation_message(&self) -> String {
        let sections: Vec<&str> = self.sections.iter().map(|s| s.as_str()).collect();
        let destinations: Vec<&str> = self.destinations.iter().map(Timeframe::as_str).collect();
        format!(
            "Push {} from {}/{} to {}? \
             This will OVERWRITE those sections in the destination timeframes.",
            sections.join(", "),
            self.source,
            self.model,
            destinations.join(", "),
        )
    }

    pub fn confirm(self) -> ConfirmedPush {
        ConfirmedPush { plan: self }
    }
}

/// A push the user agreed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPush {
    plan: PushPlan,
}

impl ConfirmedPush {
    pub fn plan(&self) -> &PushPlan {
        &self.plan
    }

    /// Overwrite each selected section in every destination with a copy of the
    /// source's. Destination nodes that don't exist yet are created.
    pub fn apply(&self, doc: &ConfigDocument) -> Result<ConfigDocument, PushError> {
        let plan = &self.plan;
        let source = doc
            .model_config(&plan.source, &plan.model)
            .cloned()
            .ok_or_else(|| PushError::UnknownSource {
                timeframe: plan.source.clone(),
                model: plan.model.clone(),
            })?;

        let mut next = doc.clone();
        for tf in &plan.destinations {
            let target = next.model_config_mut(tf, &plan.model);
            for section in &plan.sections {
                match section {
                    Section::Hyperparameters => {
                        target.hyperparameters = source.hyperparameters.clone()
                    }
                    Section::Features => target.features = source.features.clone(),
                    Section::Architecture => target.architecture = source.architecture.clone(),
                }
            }
        }
        info!(
            source = %plan.source,
            model = %plan.model,
            destinations = plan.destinations.len(),
            sections = plan.sections.len(),
            "push applied"
        );
        Ok(next)
    }
}

fn dedup<T: PartialEq>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
