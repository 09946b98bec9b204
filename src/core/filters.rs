use crate::models::{FamilyStatus, FamilyType, Gender, ProfileRecord};
use std::cmp::Ordering;

/// Sortable profile columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderField {
    #[default]
    CreatedAt,
    Height,
    Weight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileOrdering {
    pub field: OrderField,
    pub descending: bool,
}

impl Default for ProfileOrdering {
    /// Newest profiles first
    fn default() -> Self {
        Self {
            field: OrderField::CreatedAt,
            descending: true,
        }
    }
}

impl ProfileOrdering {
    /// Parse an `ordering` parameter such as `-height`. Unknown fields yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let (descending, name) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let field = match name {
            "created_at" => OrderField::CreatedAt,
            "height" => OrderField::Height,
            "weight" => OrderField::Weight,
            _ => return None,
        };
        Some(Self { field, descending })
    }
}

/// Narrowing filters applied on top of the discovery scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFilter {
    pub gender: Option<Gender>,
    pub city: Option<String>,
    pub city_contains: Option<String>,
    pub state: Option<String>,
    pub state_contains: Option<String>,
    pub country: Option<String>,
    pub country_contains: Option<String>,
    pub family_type: Option<FamilyType>,
    pub family_status: Option<FamilyStatus>,
    pub height_min: Option<f64>,
    pub height_max: Option<f64>,
    pub weight_min: Option<f64>,
    pub weight_max: Option<f64>,
    pub siblings: Option<i32>,
    pub siblings_min: Option<i32>,
    pub siblings_max: Option<i32>,
    pub search: Option<String>,
    pub ordering: ProfileOrdering,
}

impl ProfileFilter {
    /// Whitespace-separated search terms; each must match some searchable field
    pub fn search_terms(&self) -> Vec<&str> {
        self.search
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }
}

#[inline]
fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[inline]
fn in_range<T: PartialOrd + Copy>(value: Option<T>, min: Option<T>, max: Option<T>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    // Rows with no value never satisfy a range condition
    let Some(v) = value else {
        return false;
    };
    min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
}

/// Check whether a profile passes every narrowing filter
#[inline]
pub fn matches_filter(record: &ProfileRecord, filter: &ProfileFilter) -> bool {
    let profile = &record.profile;

    if let Some(gender) = filter.gender {
        if profile.gender != Some(gender) {
            return false;
        }
    }

    let exact_text = [
        (&filter.city, &profile.city),
        (&filter.state, &profile.state),
        (&filter.country, &profile.country),
    ];
    if exact_text
        .iter()
        .any(|(wanted, actual)| wanted.as_ref().is_some_and(|w| w != *actual))
    {
        return false;
    }

    let partial_text = [
        (&filter.city_contains, &profile.city),
        (&filter.state_contains, &profile.state),
        (&filter.country_contains, &profile.country),
    ];
    if partial_text
        .iter()
        .any(|(wanted, actual)| wanted.as_ref().is_some_and(|w| !contains_ci(actual, w)))
    {
        return false;
    }

    if filter.family_type.is_some() && profile.family_type != filter.family_type {
        return false;
    }
    if filter.family_status.is_some() && profile.family_status != filter.family_status {
        return false;
    }

    if !in_range(profile.height, filter.height_min, filter.height_max)
        || !in_range(profile.weight, filter.weight_min, filter.weight_max)
        || !in_range(profile.siblings, filter.siblings_min, filter.siblings_max)
    {
        return false;
    }

    if filter.siblings.is_some() && profile.siblings != filter.siblings {
        return false;
    }

    filter.search_terms().iter().all(|term| {
        [
            record.owner.first_name.as_str(),
            record.owner.last_name.as_str(),
            record.owner.email.as_str(),
            profile.city.as_str(),
            profile.state.as_str(),
            profile.bio.as_str(),
        ]
        .iter()
        .any(|field| contains_ci(field, term))
    })
}

/// Missing values sort as larger than any value, as in PostgreSQL
fn cmp_nullable(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Total order used for listings: the requested field, then newest first, then id
pub fn compare_records(a: &ProfileRecord, b: &ProfileRecord, ordering: &ProfileOrdering) -> Ordering {
    let primary = match ordering.field {
        OrderField::CreatedAt => a.profile.created_at.cmp(&b.profile.created_at),
        OrderField::Height => cmp_nullable(a.profile.height, b.profile.height),
        OrderField::Weight => cmp_nullable(a.profile.weight, b.profile.weight),
    };
    let primary = if ordering.descending {
        primary.reverse()
    } else {
        primary
    };

    primary
        .then_with(|| b.profile.created_at.cmp(&a.profile.created_at))
        .then_with(|| b.id().cmp(&a.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Owner, Profile};
    use chrono::{Duration, Utc};

    fn create_test_record(id: i64, gender: Gender, height: Option<f64>) -> ProfileRecord {
        let mut profile = Profile::empty(id, Utc::now() + Duration::seconds(id));
        profile.gender = Some(gender);
        profile.height = height;
        profile.city = "New York".to_string();
        profile.state = "New York".to_string();
        profile.bio = "Nature lover who enjoys hiking".to_string();
        ProfileRecord {
            profile,
            owner: Owner {
                username: format!("user{}", id),
                email: format!("user{}@example.com", id),
                first_name: "Emma".to_string(),
                last_name: "Smith".to_string(),
            },
            interests: vec![],
        }
    }

    #[test]
    fn test_ordering_parse() {
        assert_eq!(
            ProfileOrdering::parse("-height"),
            Some(ProfileOrdering {
                field: OrderField::Height,
                descending: true
            })
        );
        assert_eq!(
            ProfileOrdering::parse("weight").map(|o| o.descending),
            Some(false)
        );
        assert_eq!(ProfileOrdering::parse("bio"), None);
    }

    #[test]
    fn test_empty_filter_matches() {
        let record = create_test_record(1, Gender::Female, None);
        assert!(matches_filter(&record, &ProfileFilter::default()));
    }

    #[test]
    fn test_exact_and_partial_city() {
        let record = create_test_record(1, Gender::Female, None);

        let exact = ProfileFilter {
            city: Some("new york".to_string()),
            ..Default::default()
        };
        assert!(!matches_filter(&record, &exact));

        let partial = ProfileFilter {
            city_contains: Some("YORK".to_string()),
            ..Default::default()
        };
        assert!(matches_filter(&record, &partial));
    }

    #[test]
    fn test_height_range_excludes_missing_values() {
        let tall = create_test_record(1, Gender::Female, Some(172.5));
        let unknown = create_test_record(2, Gender::Female, None);
        let filter = ProfileFilter {
            height_min: Some(170.0),
            height_max: Some(180.0),
            ..Default::default()
        };

        assert!(matches_filter(&tall, &filter));
        assert!(!matches_filter(&unknown, &filter));
    }

    #[test]
    fn test_search_requires_every_term() {
        let record = create_test_record(1, Gender::Female, None);

        let hit = ProfileFilter {
            search: Some("emma hiking".to_string()),
            ..Default::default()
        };
        assert!(matches_filter(&record, &hit));

        let miss = ProfileFilter {
            search: Some("emma chicago".to_string()),
            ..Default::default()
        };
        assert!(!matches_filter(&record, &miss));
    }

    #[test]
    fn test_compare_newest_first_by_default() {
        let older = create_test_record(1, Gender::Female, None);
        let newer = create_test_record(2, Gender::Female, None);
        let mut records = vec![older, newer];

        records.sort_by(|a, b| compare_records(a, b, &ProfileOrdering::default()));

        assert_eq!(records[0].id(), 2);
    }

    #[test]
    fn test_compare_height_puts_missing_last_when_ascending() {
        let unknown = create_test_record(1, Gender::Female, None);
        let short = create_test_record(2, Gender::Female, Some(150.0));
        let tall = create_test_record(3, Gender::Female, Some(180.0));
        let mut records = vec![unknown, tall, short];

        let ordering = ProfileOrdering::parse("height").unwrap();
        records.sort_by(|a, b| compare_records(a, b, &ordering));

        let ids: Vec<i64> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
