use thiserror::Error;

/// Malformed-input errors: constructions the engine deliberately does not
/// support. These are raised as fatal, user-visible errors rather than
/// silently approximated, since silent mishandling would produce an unsound
/// proof state. Invariant violations (bad indices, foreign sites) are caller
/// bugs and panic instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The conditional-to-choice-function conversion supports exactly one
    /// alternative plus the otherwise-result.
    #[error("conditional term has {0} alternatives; only one is supported")]
    MultipleAlternatives(usize),

    /// The theorem library is read-only for the life of a proof state.
    #[error("theorem library sites cannot be altered")]
    TheoremImmutable,
}
