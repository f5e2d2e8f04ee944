use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid encoding budget: {0}")]
    InvalidBudget(String),

    #[error("Tweet text is invalid: {0}")]
    InvalidTweet(String),
}
