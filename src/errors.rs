// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture and render pipeline
//!
//! Every failure reported through a status callback carries an [`ErrorCode`]
//! (a stable integer) plus the original diagnostic message.

use std::fmt;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Stable integer codes delivered with every `on_error` callback
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The camera device could not be opened
    HardwareOpenFailed = 1,
    /// Size/format negotiation produced no settable configuration
    ParameterRejected = 2,
    /// Preview could not be started (surface invalid, device not ready)
    PreviewFailed = 3,
    /// Preview could not be stopped cleanly
    StopFailed = 4,
    /// A filter shader failed to compile
    ShaderCompileFailed = 5,
    /// A filter program failed to link
    ProgramLinkFailed = 6,
    /// The GPU context could not be created or bound to the surface
    ContextCreationFailed = 7,
    /// A filter stage could not draw or its offscreen target could not be built
    RenderFailed = 8,
}

impl ErrorCode {
    /// All codes, in numeric order
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::HardwareOpenFailed,
        ErrorCode::ParameterRejected,
        ErrorCode::PreviewFailed,
        ErrorCode::StopFailed,
        ErrorCode::ShaderCompileFailed,
        ErrorCode::ProgramLinkFailed,
        ErrorCode::ContextCreationFailed,
        ErrorCode::RenderFailed,
    ];

    /// The integer value sent to listeners
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Look up a code from its integer value
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_i32() == value)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::HardwareOpenFailed => "HardwareOpenFailed",
            ErrorCode::ParameterRejected => "ParameterRejected",
            ErrorCode::PreviewFailed => "PreviewFailed",
            ErrorCode::StopFailed => "StopFailed",
            ErrorCode::ShaderCompileFailed => "ShaderCompileFailed",
            ErrorCode::ProgramLinkFailed => "ProgramLinkFailed",
            ErrorCode::ContextCreationFailed => "ContextCreationFailed",
            ErrorCode::RenderFailed => "RenderFailed",
        };
        write!(f, "{}({})", name, self.as_i32())
    }
}

/// Pipeline error, one variant per [`ErrorCode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    HardwareOpenFailed(String),
    ParameterRejected(String),
    PreviewFailed(String),
    StopFailed(String),
    ShaderCompileFailed(String),
    ProgramLinkFailed(String),
    ContextCreationFailed(String),
    RenderFailed(String),
}

impl PipelineError {
    /// The stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::HardwareOpenFailed(_) => ErrorCode::HardwareOpenFailed,
            PipelineError::ParameterRejected(_) => ErrorCode::ParameterRejected,
            PipelineError::PreviewFailed(_) => ErrorCode::PreviewFailed,
            PipelineError::StopFailed(_) => ErrorCode::StopFailed,
            PipelineError::ShaderCompileFailed(_) => ErrorCode::ShaderCompileFailed,
            PipelineError::ProgramLinkFailed(_) => ErrorCode::ProgramLinkFailed,
            PipelineError::ContextCreationFailed(_) => ErrorCode::ContextCreationFailed,
            PipelineError::RenderFailed(_) => ErrorCode::RenderFailed,
        }
    }

    /// The diagnostic message carried alongside the code
    pub fn message(&self) -> &str {
        match self {
            PipelineError::HardwareOpenFailed(msg)
            | PipelineError::ParameterRejected(msg)
            | PipelineError::PreviewFailed(msg)
            | PipelineError::StopFailed(msg)
            | PipelineError::ShaderCompileFailed(msg)
            | PipelineError::ProgramLinkFailed(msg)
            | PipelineError::ContextCreationFailed(msg)
            | PipelineError::RenderFailed(msg) => msg,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::HardwareOpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            PipelineError::ParameterRejected(msg) => {
                write!(f, "Camera parameters rejected: {}", msg)
            }
            PipelineError::PreviewFailed(msg) => write!(f, "Failed to start preview: {}", msg),
            PipelineError::StopFailed(msg) => write!(f, "Failed to stop preview: {}", msg),
            PipelineError::ShaderCompileFailed(msg) => {
                write!(f, "Shader compilation failed: {}", msg)
            }
            PipelineError::ProgramLinkFailed(msg) => write!(f, "Program link failed: {}", msg),
            PipelineError::ContextCreationFailed(msg) => {
                write!(f, "GPU context creation failed: {}", msg)
            }
            PipelineError::RenderFailed(msg) => write!(f, "Render failed: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Configuration loading/saving errors
#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    Io(std::io::Error),
    /// The file is not valid JSON for [`crate::config::Config`]
    Parse(serde_json::Error),
    /// No platform config directory could be determined
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Invalid configuration: {}", e),
            ConfigError::NoConfigDir => write!(f, "No configuration directory available"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::NoConfigDir => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}
