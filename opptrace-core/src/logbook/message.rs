//! Human-readable logbook phrases
//!
//! [`logbook_message`] is a pure function of `(domain, device_class, state)`
//! and is total: every input yields a non-empty phrase, falling back to
//! `changed to state X` when no rule applies.

const STATE_ON: &str = "on";
const STATE_OFF: &str = "off";
const STATE_UNAVAILABLE: &str = "unavailable";
const STATE_UNKNOWN: &str = "unknown";

/// Domains with their own phrasing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogbookDomain {
    DeviceTracker,
    Person,
    Sun,
    BinarySensor,
    Cover,
    Lock,
    Other,
}

impl LogbookDomain {
    pub fn from_domain(domain: &str) -> Self {
        match domain {
            "device_tracker" => LogbookDomain::DeviceTracker,
            "person" => LogbookDomain::Person,
            "sun" => LogbookDomain::Sun,
            "binary_sensor" => LogbookDomain::BinarySensor,
            "cover" => LogbookDomain::Cover,
            "lock" => LogbookDomain::Lock,
            _ => LogbookDomain::Other,
        }
    }
}

/// Binary sensor device classes with their own phrasing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySensorClass {
    Battery,
    Connectivity,
    /// door, garage_door, opening, window
    Opening,
    Lock,
    Plug,
    Presence,
    Safety,
    /// cold, gas, heat, light, moisture, motion, occupancy, power, problem,
    /// smoke, sound, vibration
    Detection,
    Other,
}

impl BinarySensorClass {
    pub fn from_device_class(device_class: &str) -> Self {
        match device_class {
            "battery" => BinarySensorClass::Battery,
            "connectivity" => BinarySensorClass::Connectivity,
            "door" | "garage_door" | "opening" | "window" => BinarySensorClass::Opening,
            "lock" => BinarySensorClass::Lock,
            "plug" => BinarySensorClass::Plug,
            "presence" => BinarySensorClass::Presence,
            "safety" => BinarySensorClass::Safety,
            "cold" | "gas" | "heat" | "light" | "moisture" | "motion" | "occupancy" | "power"
            | "problem" | "smoke" | "sound" | "vibration" => BinarySensorClass::Detection,
            _ => BinarySensorClass::Other,
        }
    }
}

/// Phrase describing an entity reaching `state`.
pub fn logbook_message(domain: &str, device_class: Option<&str>, state: &str) -> String {
    specific_message(domain, device_class, state).unwrap_or_else(|| generic_message(state))
}

fn specific_message(domain: &str, device_class: Option<&str>, state: &str) -> Option<String> {
    match LogbookDomain::from_domain(domain) {
        LogbookDomain::DeviceTracker | LogbookDomain::Person => match state {
            "" => None,
            "not_home" => Some("was away".to_string()),
            "home" => Some("was home".to_string()),
            zone => Some(format!("was at {}", zone)),
        },
        LogbookDomain::Sun => match state {
            "above_horizon" => Some("rose".to_string()),
            "below_horizon" => Some("set".to_string()),
            _ => None,
        },
        LogbookDomain::BinarySensor => binary_sensor_message(device_class?, state),
        LogbookDomain::Cover => match state {
            "open" => Some("was opened".to_string()),
            "opening" => Some("is opening".to_string()),
            "closing" => Some("is closing".to_string()),
            "closed" => Some("was closed".to_string()),
            _ => None,
        },
        LogbookDomain::Lock => match state {
            "unlocked" => Some("was unlocked".to_string()),
            "locked" => Some("was locked".to_string()),
            "unlocking" => Some("is unlocking".to_string()),
            "locking" => Some("is locking".to_string()),
            "jammed" => Some("is jammed".to_string()),
            _ => None,
        },
        LogbookDomain::Other => None,
    }
}

fn binary_sensor_message(device_class: &str, state: &str) -> Option<String> {
    let is_on = match state {
        STATE_ON => true,
        STATE_OFF => false,
        _ => return None,
    };

    let (on, off) = match BinarySensorClass::from_device_class(device_class) {
        BinarySensorClass::Battery => ("was low", "was normal"),
        BinarySensorClass::Connectivity => ("was connected", "was disconnected"),
        BinarySensorClass::Opening => ("was opened", "was closed"),
        BinarySensorClass::Lock => ("was unlocked", "was locked"),
        BinarySensorClass::Plug => ("was plugged in", "was unplugged"),
        BinarySensorClass::Presence => ("was home", "was away"),
        BinarySensorClass::Safety => ("was unsafe", "was safe"),
        BinarySensorClass::Detection => {
            let label = device_class.replace('_', " ");
            return Some(if is_on {
                format!("detected {}", label)
            } else {
                format!("cleared (no {} detected)", label)
            });
        }
        BinarySensorClass::Other => return None,
    };

    Some(if is_on { on } else { off }.to_string())
}

fn generic_message(state: &str) -> String {
    match state {
        STATE_ON => "turned on".to_string(),
        STATE_OFF => "turned off".to_string(),
        STATE_UNAVAILABLE => "became unavailable".to_string(),
        STATE_UNKNOWN => "became unknown".to_string(),
        "" => "changed to an empty state".to_string(),
        other => format!("changed to state {}", other),
    }
}
