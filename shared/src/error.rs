//! Error handling for the scanner workspace

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Camera unavailable after {attempts} attempts: {message}")]
    DeviceUnavailable { attempts: usize, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Timeout error: {operation}")]
    Timeout { operation: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    pub fn device_unavailable(attempts: usize, message: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            attempts,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn service_unavailable(service: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
        }
    }

    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Device { .. } => "DEVICE_ERROR",
            AppError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            AppError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            AppError::Configuration { .. } => "CONFIG_ERROR",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::HttpClient(_) => "HTTP_CLIENT_ERROR",
            AppError::Image(_) => "IMAGE_ERROR",
            AppError::Url(_) => "URL_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Generic(_) => "GENERIC_ERROR",
        }
    }
}
