// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// handshake errors
    #[error("invalid connection preface")]
    InvalidPreface,

    /// framing errors
    #[error("short read: {0}")]
    ShortRead(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame payload of {0} bytes exceeds the 24-bit length field")]
    FrameTooLarge(usize),

    /// stream-level anomalies, recoverable per connection
    #[error("header block decode failed: {0}")]
    HeaderDecode(String),

    #[error("frame references unknown stream {0}")]
    UnknownStream(u32),

    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("I/O error: {0}")]
    DetailedIoError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// marker error
    #[error("incomplete frame")]
    Incomplete,
}

impl AppError {
    /// Anomalies that invalidate a single frame's effect but leave the
    /// connection's framing intact. Everything else terminates the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::HeaderDecode(_) | AppError::UnknownStream(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_frame_scoped() {
        assert!(AppError::UnknownStream(3).is_recoverable());
        assert!(AppError::HeaderDecode("bad index".into()).is_recoverable());
        assert!(!AppError::InvalidPreface.is_recoverable());
        assert!(!AppError::MalformedFrame("truncated".into()).is_recoverable());
        assert!(!AppError::FrameTooLarge(1 << 24).is_recoverable());
    }
}
