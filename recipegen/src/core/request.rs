//! The ephemeral request handed to a generation run.

use crate::credentials::Credential;

use super::recipe::UnitSystem;

/// Which credential a run draws from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CredentialClass {
    /// The caller supplied their own key.
    Personal(Credential),
    /// The service's shared pool; subject to the shared-credential limiter.
    #[default]
    Shared,
}

impl CredentialClass {
    /// Returns true for the shared pool.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared)
    }
}

/// Whether a run drafts a new recipe or refines an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// First generation for a freshly drafted record.
    #[default]
    Initial,
    /// A follow-up on a record that already has history.
    Refine {
        /// The follow-up instruction.
        followup: String,
    },
}

/// Everything a run needs besides the record itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// The user's prompt.
    pub prompt: String,
    /// Preferred unit system.
    pub unit_system: UnitSystem,
    /// Free-text personalization (allergies, equipment, taste).
    pub requirements: String,
    /// Credential class for this run.
    pub credential_class: CredentialClass,
    /// Initial or refinement.
    pub mode: GenerationMode,
}

impl GenerationRequest {
    /// Creates an initial request on the shared credential pool.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            unit_system: UnitSystem::default(),
            requirements: String::new(),
            credential_class: CredentialClass::Shared,
            mode: GenerationMode::Initial,
        }
    }

    /// Sets the unit system.
    #[must_use]
    pub fn with_unit_system(mut self, unit_system: UnitSystem) -> Self {
        self.unit_system = unit_system;
        self
    }

    /// Sets the personalization text.
    #[must_use]
    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = requirements.into();
        self
    }

    /// Uses the caller's own credential instead of the shared pool.
    #[must_use]
    pub fn with_personal_credential(mut self, credential: Credential) -> Self {
        self.credential_class = CredentialClass::Personal(credential);
        self
    }

    /// Turns the request into a refinement with the given follow-up.
    #[must_use]
    pub fn refining(mut self, followup: impl Into<String>) -> Self {
        self.mode = GenerationMode::Refine {
            followup: followup.into(),
        };
        self
    }

    /// Rejects requests that can never produce a recipe.
    ///
    /// An empty prompt is allowed; the model then picks a dish itself.
    pub fn validate(&self) -> Result<(), String> {
        if let CredentialClass::Personal(credential) = &self.credential_class {
            if credential.is_blank() {
                return Err("personal credential is blank".to_string());
            }
        }
        if let GenerationMode::Refine { followup } = &self.mode {
            if followup.trim().is_empty() {
                return Err("follow-up prompt is empty".to_string());
            }
        }
        Ok(())
    }
}
