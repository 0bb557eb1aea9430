use crate::errors::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {}", .code.as_str(), .description)]
pub struct FedqlError {
    pub code: ErrorCode,
    pub description: String,
}

impl FedqlError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}
