use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: String, max: String },
}
