use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A chat model identifier.
///
/// This can be a model the client knows by name or any other string the
/// endpoint accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model names.
    Known(KnownModel),

    /// Any other model identifier (fine-tunes, local servers, new releases).
    Custom(String),
}

/// Model names the client knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// gpt-3.5-turbo-16k
    #[serde(rename = "gpt-3.5-turbo-16k")]
    Gpt35Turbo16k,

    /// gpt-4
    #[serde(rename = "gpt-4")]
    Gpt4,

    /// gpt-3.5-turbo
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,

    /// gpt-4-turbo
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,

    /// gpt-4o
    #[serde(rename = "gpt-4o")]
    Gpt4o,

    /// gpt-4o-mini
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
}

impl KnownModel {
    /// Every known model.
    pub const ALL: [KnownModel; 6] = [
        KnownModel::Gpt35Turbo16k,
        KnownModel::Gpt4,
        KnownModel::Gpt35Turbo,
        KnownModel::Gpt4Turbo,
        KnownModel::Gpt4o,
        KnownModel::Gpt4oMini,
    ];

    /// The identifier sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            KnownModel::Gpt35Turbo16k => "gpt-3.5-turbo-16k",
            KnownModel::Gpt4 => "gpt-4",
            KnownModel::Gpt35Turbo => "gpt-3.5-turbo",
            KnownModel::Gpt4Turbo => "gpt-4-turbo",
            KnownModel::Gpt4o => "gpt-4o",
            KnownModel::Gpt4oMini => "gpt-4o-mini",
        }
    }
}

/// The models `!model` cycles through unless configured otherwise.
pub fn default_model_cycle() -> Vec<Model> {
    vec![
        Model::Known(KnownModel::Gpt35Turbo16k),
        Model::Known(KnownModel::Gpt4),
        Model::Known(KnownModel::Gpt35Turbo),
    ]
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{known_model}"),
            Model::Custom(custom) => write!(f, "{custom}"),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownModel::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| format!("unknown model: {s}"))
    }
}

impl FromStr for Model {
    type Err = String;

    /// Never fails: names the client does not know become [`Model::Custom`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<KnownModel>()
            .map(Model::Known)
            .unwrap_or_else(|_| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        model
            .parse::<KnownModel>()
            .map(Model::Known)
            .unwrap_or(Model::Custom(model))
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        Model::from(model.to_string())
    }
}
