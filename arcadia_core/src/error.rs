use std::fmt;

/// Status codes surfaced across the runtime boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Status {
    Success,
    AllocationFailed,
    ArgumentTypeInvalid,
    ArgumentValueInvalid,
    OperationInvalid,
    NumberOfArgumentsInvalid,
    TypeExists,
    TypeNotExists,
    EnvironmentFailed,
    NotExists,
    NotFound,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::AllocationFailed => "allocation failed",
            Status::ArgumentTypeInvalid => "argument type invalid",
            Status::ArgumentValueInvalid => "argument value invalid",
            Status::OperationInvalid => "operation invalid",
            Status::NumberOfArgumentsInvalid => "number of arguments invalid",
            Status::TypeExists => "type exists",
            Status::TypeNotExists => "type not exists",
            Status::EnvironmentFailed => "environment failed",
            Status::NotExists => "not exists",
            Status::NotFound => "not found",
        }
    }

    /// Process exit status for this code. Only `Success` maps to zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            Status::Success => 0,
            Status::AllocationFailed => 1,
            Status::ArgumentTypeInvalid => 2,
            Status::ArgumentValueInvalid => 3,
            Status::OperationInvalid => 4,
            Status::NumberOfArgumentsInvalid => 5,
            Status::TypeExists => 6,
            Status::TypeNotExists => 7,
            Status::EnvironmentFailed => 8,
            Status::NotExists => 9,
            Status::NotFound => 10,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ArcadiaError {
    pub status: Status,
    pub message: String,
}

pub type ArcadiaResult<T> = Result<T, ArcadiaError>;

impl ArcadiaError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn allocation_failed(message: impl Into<String>) -> Self {
        Self::new(Status::AllocationFailed, message)
    }

    pub fn argument_type_invalid(message: impl Into<String>) -> Self {
        Self::new(Status::ArgumentTypeInvalid, message)
    }

    pub fn argument_value_invalid(message: impl Into<String>) -> Self {
        Self::new(Status::ArgumentValueInvalid, message)
    }

    pub fn operation_invalid(message: impl Into<String>) -> Self {
        Self::new(Status::OperationInvalid, message)
    }

    pub fn number_of_arguments_invalid(expected: usize, got: usize) -> Self {
        Self::new(
            Status::NumberOfArgumentsInvalid,
            format!("expected {} arguments, got {}", expected, got),
        )
    }

    pub fn type_exists(name: &str) -> Self {
        Self::new(Status::TypeExists, format!("type '{}' is already registered", name))
    }

    pub fn type_not_exists(name: &str) -> Self {
        Self::new(Status::TypeNotExists, format!("type '{}' is not registered", name))
    }

    pub fn environment_failed(message: impl Into<String>) -> Self {
        Self::new(Status::EnvironmentFailed, message)
    }

    pub fn not_exists(message: impl Into<String>) -> Self {
        Self::new(Status::NotExists, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Status::NotFound, message)
    }

    pub fn status(&self) -> Status {
        self.status
    }
}
