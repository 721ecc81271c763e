//! Random request payloads, so probe traffic is not trivially cacheable.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

const TYPE_TAGS: [&str; 5] = ["A", "B", "C", "D", "E"];
const ALL_TAGS: [&str; 5] = [
    "monitoring",
    "test",
    "production",
    "staging",
    "development",
];

/// Build a randomized JSON payload for one probe request.
pub fn random_payload() -> Value {
    let mut rng = rand::thread_rng();

    let type_tag = TYPE_TAGS.choose(&mut rng).copied().unwrap_or("A");
    let tag_count = rng.gen_range(1..=3);
    let tags: Vec<&str> = ALL_TAGS
        .choose_multiple(&mut rng, tag_count)
        .copied()
        .collect();

    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "requestId": Uuid::new_v4(),
        "data": {
            "value": rng.gen::<f64>() * 100.0,
            "type": type_tag,
            "isActive": rng.gen_bool(0.5),
            "nested": {
                "flag": rng.gen_bool(0.5),
                "count": rng.gen_range(0..1000),
                "tags": tags,
            },
        },
        "metadata": {
            "source": "pulsewatch",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let p = random_payload();
        assert!(p["requestId"].is_string());
        assert!(p["data"]["value"].is_number());
        assert!(TYPE_TAGS.contains(&p["data"]["type"].as_str().unwrap()));

        let tags = p["data"]["nested"]["tags"].as_array().unwrap();
        assert!(!tags.is_empty() && tags.len() <= 3);
        for t in tags {
            assert!(ALL_TAGS.contains(&t.as_str().unwrap()));
        }
    }

    #[test]
    fn test_payloads_are_distinct() {
        let a = random_payload();
        let b = random_payload();
        assert_ne!(a["requestId"], b["requestId"]);
    }
}
