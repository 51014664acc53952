use std::fmt;
use std::str::FromStr;

/// Number of actuator slots a group controller can hold.
pub const SLOT_COUNT: usize = 4;

/// Output port an actuator is wired to. Doubles as the slot index in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Port {
    A,
    B,
    C,
    D,
}

impl Port {
    pub const ALL: [Port; SLOT_COUNT] = [Port::A, Port::B, Port::C, Port::D];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Port::A => "A",
            Port::B => "B",
            Port::C => "C",
            Port::D => "D",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePortError(pub String);

impl fmt::Display for ParsePortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown port '{}' (expected one of A, B, C, D)", self.0)
    }
}

impl std::error::Error for ParsePortError {}

impl FromStr for Port {
    type Err = ParsePortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Port::A),
            "B" => Ok(Port::B),
            "C" => Ok(Port::C),
            "D" => Ok(Port::D),
            _ => Err(ParsePortError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_from_index() {
        for p in Port::ALL {
            assert_eq!(Port::from_index(p.index()), Some(p));
        }
        assert_eq!(Port::from_index(SLOT_COUNT), None);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("b".parse::<Port>().unwrap(), Port::B);
        assert_eq!(" D ".parse::<Port>().unwrap(), Port::D);
        let err = "E".parse::<Port>().unwrap_err();
        assert!(err.to_string().contains("unknown port"));
    }
}
