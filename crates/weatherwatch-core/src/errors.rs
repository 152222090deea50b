use std::time::Duration;

/// Errors raised while talking to a weather data source.
#[derive(Clone, Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("network error: {0}")]
    Network(String),
    #[error("weather source returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode weather source response: {0}")]
    Decode(String),
    #[error("unknown location: {0}")]
    UnknownLocation(String),
    #[error("weather client has not been initialised")]
    NotInitialised,
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("weather source unavailable: {0}")]
    Unavailable(String),
}

impl WeatherError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::UnknownLocation(_) => "unknown_location",
            Self::NotInitialised => "not_initialised",
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Whether the failure is specific to one location rather than the source.
    pub fn is_location_error(&self) -> bool {
        matches!(self, Self::UnknownLocation(_))
    }

    /// Classify a non-success HTTP status from a weather source.
    pub fn from_status(status: u16, body: String, location: Option<&str>) -> Self {
        match (status, location) {
            (404, Some(loc)) => Self::UnknownLocation(loc.to_string()),
            (502..=504, _) => Self::Unavailable(format!("status {status}: {body}")),
            _ => Self::Status { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            WeatherError::from_status(404, "nope".into(), Some("Geelong")),
            WeatherError::UnknownLocation(ref l) if l == "Geelong"
        ));
        assert!(matches!(
            WeatherError::from_status(404, "nope".into(), None),
            WeatherError::Status { status: 404, .. }
        ));
        assert!(matches!(
            WeatherError::from_status(503, "down".into(), None),
            WeatherError::Unavailable(_)
        ));
        assert!(matches!(
            WeatherError::from_status(500, "boom".into(), Some("Melbourne")),
            WeatherError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn location_errors_are_classified() {
        assert!(WeatherError::UnknownLocation("x".into()).is_location_error());
        assert!(!WeatherError::NotInitialised.is_location_error());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(WeatherError::NotInitialised.error_kind(), "not_initialised");
        assert_eq!(
            WeatherError::Timeout(Duration::from_secs(3)).error_kind(),
            "timeout"
        );
        assert_eq!(WeatherError::Decode("bad".into()).error_kind(), "decode");
    }

    #[test]
    fn display_includes_detail() {
        let err = WeatherError::Status {
            status: 500,
            body: "internal".into(),
        };
        assert_eq!(err.to_string(), "weather source returned 500: internal");
    }
}
