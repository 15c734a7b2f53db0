//! Environment naming: name validation and `<name>/<adjective>-<animal>` ids.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::StoreError;

const MAX_NAME_BYTES: usize = 100;

const FORBIDDEN: &[&str] = &[
    "~", "^", ":", "?", "*", "[", "\\", "/", "\"", "<", ">", "|", "@", "{", "}", "..", "\t", "\n",
    "\r",
];

const ADJECTIVES: &[&str] = &[
    "able", "amused", "bold", "brave", "bright", "calm", "careful", "clever", "cool", "cosmic",
    "crisp", "daring", "eager", "easy", "fair", "famous", "fast", "fine", "fond", "frank",
    "gentle", "glad", "golden", "grand", "happy", "hardy", "honest", "humble", "jolly", "keen",
    "kind", "lively", "loyal", "lucky", "mellow", "merry", "mighty", "modest", "neat", "noble",
    "patient", "plucky", "polite", "proud", "quick", "quiet", "rapid", "ready", "robust", "shy",
    "smart", "snappy", "solid", "steady", "sunny", "swift", "tidy", "tough", "vivid", "witty",
];

const ANIMALS: &[&str] = &[
    "ant", "badger", "bat", "bear", "beaver", "bee", "bison", "boar", "camel", "cat", "cobra",
    "crab", "crane", "crow", "deer", "dingo", "dodo", "dog", "dove", "eagle", "eel", "elk",
    "ferret", "finch", "fox", "frog", "gecko", "goat", "goose", "hare", "hawk", "heron", "ibis",
    "koala", "lark", "lemur", "lion", "llama", "lynx", "mink", "mole", "moose", "newt", "otter",
    "owl", "panda", "pony", "puma", "quail", "raven", "seal", "shark", "sloth", "snail", "swan",
    "tiger", "toad", "trout", "wolf", "yak",
];

/// Reject names that are not safe as the first component of a git branch.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.contains(' ') {
        return Err(invalid("name cannot contain spaces, use hyphens (-) instead"));
    }
    if name.contains('_') {
        return Err(invalid(
            "name cannot contain underscores, use hyphens (-) instead",
        ));
    }
    if let Some(bad) = FORBIDDEN.iter().find(|bad| name.contains(*bad)) {
        return Err(invalid(&format!("name cannot contain '{}'", bad.escape_default())));
    }
    if name.starts_with(['-', '.']) || name.ends_with(['-', '.']) {
        return Err(invalid("name cannot start or end with hyphen or dot"));
    }
    if name.ends_with(".lock") {
        return Err(invalid("name cannot end with '.lock'"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(invalid(&format!(
            "name cannot exceed {MAX_NAME_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Build an environment id from `name` and a random two-word suffix.
pub fn generate_id<R: Rng + ?Sized>(name: &str, rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("brave");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("otter");
    format!("{name}/{adjective}-{animal}")
}

/// Return the environment name portion of an id (`web/quick-fox` -> `web`).
pub fn name_from_id(id: &str) -> &str {
    id.split_once('/').map(|(name, _)| name).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn accepts_hyphenated_names() {
        validate_name("my-web-app").expect("valid");
        validate_name("api2").expect("valid");
    }

    #[test]
    fn rejects_names_git_would_choke_on() {
        for bad in [
            "", "my app", "my_app", "a/b", "a..b", "-web", "web.", "web.lock", "x:y", "a@b",
        ] {
            let err = validate_name(bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidName { .. }), "{bad}");
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "a".repeat(MAX_NAME_BYTES + 1);
        assert!(validate_name(&long).is_err());
        validate_name(&"a".repeat(MAX_NAME_BYTES)).expect("boundary is valid");
    }

    #[test]
    fn generated_id_has_name_prefix_and_two_words() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = generate_id("web", &mut rng);
        let (name, suffix) = id.split_once('/').expect("separator");
        assert_eq!(name, "web");
        assert_eq!(suffix.split('-').count(), 2);
    }

    #[test]
    fn name_from_id_strips_suffix() {
        assert_eq!(name_from_id("web/quick-fox"), "web");
        assert_eq!(name_from_id("plain"), "plain");
    }
}
