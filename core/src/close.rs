use serde::Serialize;

/// How a WebSocket close code is read by the checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum CloseKind {
    /// 1000
    Normal,
    /// 1001
    GoingAway,
    /// 1006, no close frame received
    Abnormal,
    /// 1008
    PolicyViolation,
    /// 1011, the failure these checks exist to catch
    InternalError,
    Other(u16),
}

impl CloseKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            1000 => CloseKind::Normal,
            1001 => CloseKind::GoingAway,
            1006 => CloseKind::Abnormal,
            1008 => CloseKind::PolicyViolation,
            1011 => CloseKind::InternalError,
            other => CloseKind::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            CloseKind::Normal => 1000,
            CloseKind::GoingAway => 1001,
            CloseKind::Abnormal => 1006,
            CloseKind::PolicyViolation => 1008,
            CloseKind::InternalError => 1011,
            CloseKind::Other(code) => code,
        }
    }

    pub fn is_failure(self) -> bool {
        !matches!(self, CloseKind::Normal | CloseKind::GoingAway)
    }

    /// Auth rejection: 1008, or an application code in the 4000 range.
    pub fn is_auth_rejection(self) -> bool {
        match self {
            CloseKind::PolicyViolation => true,
            CloseKind::Other(code) => (4000..5000).contains(&code),
            _ => false,
        }
    }

    pub fn diagnosis(self) -> &'static str {
        match self {
            CloseKind::Normal => "normal closure",
            CloseKind::GoingAway => "server going away",
            CloseKind::Abnormal => "network/server issue (abnormal closure)",
            CloseKind::PolicyViolation => "auth failure (policy violation)",
            CloseKind::InternalError => "internal server error",
            CloseKind::Other(_) => "unrecognised close code",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_and_going_away_are_not_failures() {
        assert!(!CloseKind::from_code(1000).is_failure());
        assert!(!CloseKind::from_code(1001).is_failure());
    }

    #[test]
    fn internal_error_is_failure() {
        let kind = CloseKind::from_code(1011);
        assert_eq!(kind, CloseKind::InternalError);
        assert!(kind.is_failure());
        assert_eq!(kind.code(), 1011);
    }

    #[test]
    fn auth_rejections() {
        assert!(CloseKind::from_code(1008).is_auth_rejection());
        assert!(CloseKind::from_code(4001).is_auth_rejection());
        assert!(!CloseKind::from_code(1011).is_auth_rejection());
        assert_eq!(CloseKind::from_code(1006).diagnosis(), "network/server issue (abnormal closure)");
    }

    #[test]
    fn unknown_codes_keep_their_value() {
        assert_eq!(CloseKind::from_code(1013), CloseKind::Other(1013));
        assert_eq!(CloseKind::Other(1013).code(), 1013);
    }
}
