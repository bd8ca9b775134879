use std::fmt;

/// Shown for every field until the first successful round trip.
pub const YET_UNKNOWN: &str = "Yet unknown";

/// Shown as the last compensation date when the agent reports none.
pub const NEVER_COMPENSATED: &str = "Never";

/// An energy amount the client may or may not know yet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Quantity {
    Kwh(f64),
    #[default]
    Unknown,
}

impl Quantity {
    pub fn kwh(&self) -> Option<f64> {
        match self {
            Quantity::Kwh(value) => Some(*value),
            Quantity::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        self.kwh().is_some()
    }
}

impl From<Option<f64>> for Quantity {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Quantity::Unknown, Quantity::Kwh)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Kwh(value) => write!(f, "{value} kWh"),
            Quantity::Unknown => f.write_str(YET_UNKNOWN),
        }
    }
}

/// What the host displays about the household's offsetting position.
///
/// Written only by the session, once per successful round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState {
    pub to_compensate: Quantity,
    pub total_compensated: Quantity,
    pub last_compensation_date: String,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            to_compensate: Quantity::Unknown,
            total_compensated: Quantity::Unknown,
            last_compensation_date: YET_UNKNOWN.to_string(),
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "To compensate:          {}", self.to_compensate)?;
        writeln!(f, "Total compensated:      {}", self.total_compensated)?;
        write!(f, "Last compensation date: {}", self.last_compensation_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_unknown() {
        let state = ClientState::default();
        assert_eq!(state.to_compensate, Quantity::Unknown);
        assert_eq!(state.total_compensated, Quantity::Unknown);
        assert_eq!(state.last_compensation_date, YET_UNKNOWN);
        assert!(state.to_string().contains("To compensate:          Yet unknown"));
    }

    #[test]
    fn test_quantity_from_option() {
        assert_eq!(Quantity::from(Some(2.5)), Quantity::Kwh(2.5));
        assert_eq!(Quantity::from(None), Quantity::Unknown);
        assert_eq!(Quantity::Kwh(40.0).to_string(), "40 kWh");
    }
}
