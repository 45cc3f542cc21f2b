//! MQTT topic-filter matching (`+` single-level, `#` multi-level trailing
//! wildcard), used to dispatch an incoming publish to the registered
//! handler whose filter matches.

pub fn matches(topic: &str, filter: &str) -> bool {
    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    let mut ti = 0;
    let mut fi = 0;

    while fi < filter_levels.len() {
        match filter_levels[fi] {
            "#" => return true, // trailing multi-level wildcard matches everything remaining
            "+" => {
                if ti >= topic_levels.len() {
                    return false;
                }
                ti += 1;
                fi += 1;
            }
            lit => {
                if ti >= topic_levels.len() || topic_levels[ti] != lit {
                    return false;
                }
                ti += 1;
                fi += 1;
            }
        }
    }

    ti == topic_levels.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("alicia/voice/stt/request", "alicia/voice/stt/request"));
        assert!(!matches("alicia/voice/stt/request", "alicia/voice/tts/request"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("alicia/devices/lamp-1/status", "alicia/devices/+/status"));
        assert!(!matches("alicia/devices/lamp-1/extra/status", "alicia/devices/+/status"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("alicia/voice/stt/request", "alicia/voice/#"));
        assert!(matches("alicia/voice", "alicia/voice/#"));
        assert!(!matches("alicia/devices/lamp-1/status", "alicia/voice/#"));
    }

    #[test]
    fn root_hash_matches_everything() {
        assert!(matches("alicia/anything/at/all", "#"));
    }
}
