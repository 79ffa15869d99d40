use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Identifier is empty")]
    Empty,

    #[error("Identifier contains forbidden character {0:?}")]
    ForbiddenCharacter(char),
}
