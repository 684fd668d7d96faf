use crate::utils::validation::sanitize_filename;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Number of hex characters kept from a random UUID.
pub const SLUG_LEN: usize = 8;

/// Size of the slug space: 16^8 = 2^32.
pub const SLUG_SPACE: f64 = 4_294_967_296.0;

/// A freshly reserved public identity and the key its first blob goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub slug: String,
    pub storage_path: String,
}

type SlugSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Derives slugs and object keys.
///
/// Keys have the shape `{prefix}/{project_id}/{slug}/{millis}-{filename}`, so
/// every allocation embeds its instant and never lands on an existing key of the
/// same slug. Slugs are 32 random bits, which makes uniqueness probabilistic;
/// see [`collision_probability`].
#[derive(Clone)]
pub struct SlugAllocator {
    prefix: String,
    source: SlugSource,
}

impl SlugAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            source: Arc::new(random_slug),
        }
    }

    /// Replaces the randomness source; used to force collisions in tests.
    pub fn with_source(
        prefix: impl Into<String>,
        source: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            source: Arc::new(source),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn allocate(&self, project_id: &str, filename: &str, now: DateTime<Utc>) -> Allocation {
        let slug = (self.source)();
        let storage_path = self.path_for(project_id, &slug, filename, now);
        Allocation { slug, storage_path }
    }

    pub fn path_for(
        &self,
        project_id: &str,
        slug: &str,
        filename: &str,
        now: DateTime<Utc>,
    ) -> String {
        format!(
            "{}{}-{}",
            self.slug_prefix(project_id, slug),
            now.timestamp_millis(),
            sanitize_filename(filename)
        )
    }

    /// Key for a replacement blob. Moves the timestamp forward when the
    /// natural key would equal `current_path`, so a replace never writes over
    /// the blob its row points at when it starts.
    ///
    /// Two replaces of one slug racing with the same filename in the same
    /// millisecond both derive one key; the later PUT then replaces that object
    /// whole, so readers see one complete version or the other.
    pub fn next_path(
        &self,
        project_id: &str,
        slug: &str,
        filename: &str,
        current_path: &str,
        now: DateTime<Utc>,
    ) -> String {
        let mut at = now;
        loop {
            let path = self.path_for(project_id, slug, filename, at);
            if path != current_path {
                return path;
            }
            at += Duration::milliseconds(1);
        }
    }

    /// `{prefix}/{project_id}/{slug}/`. Every blob ever written for a slug lives under it.
    pub fn slug_prefix(&self, project_id: &str, slug: &str) -> String {
        format!("{}/{}/{}/", self.prefix, project_id, slug)
    }
}

impl Default for SlugAllocator {
    fn default() -> Self {
        Self::new("uploads")
    }
}

pub fn random_slug() -> String {
    let mut slug = Uuid::new_v4().simple().to_string();
    slug.truncate(SLUG_LEN);
    slug
}

pub fn is_valid_slug(slug: &str) -> bool {
    slug.len() == SLUG_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Birthday bound for `n` independently drawn slugs:
/// `P(any collision) ≈ 1 - exp(-n(n-1) / 2S)` with `S = 2^32`.
///
/// Roughly 0.01% at 1,000 slugs, 1.2% at 10,000 and 50% near 77,000.
pub fn collision_probability(n: u64) -> f64 {
    let n = n as f64;
    1.0 - (-(n * (n - 1.0)) / (2.0 * SLUG_SPACE)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn at_millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_allocate_path_shape() {
        let allocator = SlugAllocator::default();
        let allocation = allocator.allocate("p1", "report.pdf", at_millis(1_700_000_000_000));

        assert!(is_valid_slug(&allocation.slug));
        assert_eq!(
            allocation.storage_path,
            format!("uploads/p1/{}/1700000000000-report.pdf", allocation.slug)
        );
    }

    #[test]
    fn test_repeated_allocation_for_same_slug_never_shares_a_path() {
        let allocator = SlugAllocator::with_source("uploads", || "abcdef01".to_string());
        let first = allocator.allocate("p1", "report.pdf", at_millis(1_000));
        let second = allocator.allocate("p1", "report.pdf", at_millis(1_001));
        assert_eq!(first.slug, second.slug);
        assert_ne!(first.storage_path, second.storage_path);
    }

    #[test]
    fn test_next_path_skips_current_path() {
        let allocator = SlugAllocator::default();
        let now = at_millis(5_000);
        let current = allocator.path_for("p1", "abcdef01", "report.pdf", now);

        let next = allocator.next_path("p1", "abcdef01", "report.pdf", &current, now);
        assert_ne!(next, current);
        assert_eq!(next, "uploads/p1/abcdef01/5001-report.pdf");

        let other = allocator.next_path("p1", "abcdef01", "final.pdf", &current, now);
        assert_eq!(other, "uploads/p1/abcdef01/5000-final.pdf");
    }

    #[test]
    fn test_concurrent_replaces_in_one_millisecond_share_a_key() {
        let allocator = SlugAllocator::default();
        let current = allocator.path_for("p1", "abcdef01", "report.pdf", at_millis(1_000));
        let now = at_millis(9_000);

        let first = allocator.next_path("p1", "abcdef01", "report.pdf", &current, now);
        let second = allocator.next_path("p1", "abcdef01", "report.pdf", &current, now);
        assert_eq!(first, second);
        assert_ne!(first, current);
    }

    #[test]
    fn test_filename_is_sanitized_into_path() {
        let allocator = SlugAllocator::default();
        let path = allocator.path_for("p1", "abcdef01", "../../x.pdf", at_millis(1));
        assert_eq!(path, "uploads/p1/abcdef01/1-x.pdf");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("0123abcd"));
        assert!(!is_valid_slug("zzzzzzzz"));
        assert!(!is_valid_slug("0123ABCD"));
        assert!(!is_valid_slug("0123abc"));
    }

    #[test]
    fn test_collision_probability_bound() {
        assert_eq!(collision_probability(1), 0.0);
        let p_1k = collision_probability(1_000);
        assert!(p_1k > 1.0e-4 && p_1k < 1.3e-4, "p(1000) = {}", p_1k);
        let p_10k = collision_probability(10_000);
        assert!(p_10k > 0.011 && p_10k < 0.012, "p(10000) = {}", p_10k);
        assert!((collision_probability(77_163) - 0.5).abs() < 0.01);
    }

    /// 2,000 draws collide with probability ~4.7e-4. A collision here is a real
    /// duplicate and is reported, never silently absorbed.
    #[test]
    fn test_generated_slugs_are_unique() {
        let allocator = SlugAllocator::default();
        let now = Utc::now();
        let mut seen = HashSet::new();
        for i in 0..2_000 {
            let allocation = allocator.allocate("p1", "report.pdf", now);
            assert!(
                seen.insert(allocation.slug.clone()),
                "slug collision after {} draws: {} (expected probability {:.2e})",
                i,
                allocation.slug,
                collision_probability(i as u64 + 1)
            );
        }
    }

    proptest! {
        #[test]
        fn allocated_paths_stay_under_slug_prefix(
            project_id in "[a-z0-9-]{1,36}",
            filename in "\\PC{0,80}",
            millis in 0i64..4_102_444_800_000,
        ) {
            let allocator = SlugAllocator::default();
            let allocation = allocator.allocate(&project_id, &filename, at_millis(millis));
            let prefix = allocator.slug_prefix(&project_id, &allocation.slug);

            prop_assert!(is_valid_slug(&allocation.slug));
            prop_assert!(allocation.storage_path.starts_with(&prefix));
            let tail = &allocation.storage_path[prefix.len()..];
            prop_assert!(!tail.contains('/'));
            let expected_start = format!("{}-", millis);
            prop_assert!(tail.starts_with(&expected_start));
        }
    }
}
