//! Identifier generation for jobs and step containers.

use petname::Generator;
use uuid::Uuid;

/// Maximum length a step name contributes to a container name.
const STEP_NAME_FRAGMENT_LEN: usize = 10;

/// Prefix every step container name carries, for easy `docker ps` greps.
const CONTAINER_NAME_PREFIX: &str = "mlab";

/// Generates a random one-word suffix, falling back to a UUID fragment if
/// the word lists are ever unavailable.
fn random_suffix() -> String {
    petname::Petnames::default()
        .generate_one(1, "")
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

/// Generates a fresh job identifier, e.g.
/// `job-3fa4c9a1e8b34d2c9f6a1b2c7d8e9f0a-b2c7`.
pub fn job_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("job-{}-{}", uuid, random_suffix())
}

/// Truncates a job id down to a short fragment suitable for embedding in a
/// container name.
fn short_job_fragment(job_id: &str) -> String {
    job_id.chars().filter(char::is_ascii_alphanumeric).take(8).collect()
}

/// Truncates a step name to a safe length for use in a container name.
fn truncate_step_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    sanitized.chars().take(STEP_NAME_FRAGMENT_LEN).collect()
}

/// Builds a container name unique to one step invocation:
/// `mlab-<job fragment>-<step fragment>-<random suffix>`.
pub fn container_name(job_id: &str, step_name: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        CONTAINER_NAME_PREFIX,
        short_job_fragment(job_id),
        truncate_step_name(step_name),
        random_suffix()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_has_expected_prefix() {
        let id = job_id();
        assert!(id.starts_with("job-"), "got: {id}");
    }

    #[test]
    fn container_name_truncates_long_step_names() {
        let name = container_name("job-abcd1234-foo", "a-very-long-step-name-indeed");
        assert!(name.starts_with("mlab-abcd1234"), "got: {name}");
        let step_fragment = name.split('-').nth(2).unwrap();
        assert!(step_fragment.len() <= STEP_NAME_FRAGMENT_LEN);
    }

    #[test]
    fn container_names_are_unique_across_calls() {
        let a = container_name("job-abcd1234", "step");
        let b = container_name("job-abcd1234", "step");
        assert_ne!(a, b);
    }
}
