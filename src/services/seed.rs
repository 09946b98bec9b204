//! Sample accounts and profiles for development databases.
//!
//! Enabled with `store.seed_sample_profiles`; runs only against an empty store.

use crate::core::PageWindow;
use crate::models::{FamilyStatus, FamilyType, Gender};
use crate::services::auth::{hash_password, AuthError};
use crate::services::store::{IdentityStore, NewAccount, ProfileChanges, Store, StoreError};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

pub const SAMPLE_PASSWORD: &str = "password123";

const FEMALE_NAMES: &[&str] = &["Emma", "Olivia", "Ava", "Isabella", "Sophia"];
const MALE_NAMES: &[&str] = &["Liam", "Noah", "Oliver", "Elijah", "William"];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez", "Martinez",
    "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor", "Moore", "Jackson", "Martin",
];

const CITIES: &[&str] = &[
    "New York", "Los Angeles", "Chicago", "Houston", "Phoenix", "Philadelphia", "San Antonio", "San Diego",
    "Dallas", "San Jose", "Austin", "Jacksonville", "Fort Worth", "Columbus", "Charlotte",
];

const STATES: &[&str] = &["California", "New York", "Texas", "Florida", "Washington", "Illinois", "Georgia"];
const STREET_TYPES: &[&str] = &["Street", "Avenue", "Road", "Lane", "Drive", "Court", "Boulevard"];

const PHOTOS: &[&str] = &[
    "https://images.unsplash.com/photo-1712847331947-9460dd2f264b?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1534528741775-53994a69daeb?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1544005313-94ddf0286df2?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1506794778202-cad84cf45f1d?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1531746020798-e6953c6e8e04?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1580489944761-15a19d654956?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1438761681033-6461ffad8d80?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1494790108377-be9c29b29330?w=800&auto=format&fit=crop&q=60",
    "https://images.unsplash.com/photo-1500648767791-00dcc994a43e?w=800&auto=format&fit=crop&q=60",
];

const FEMALE_BIOS: &[&str] = &[
    "Software engineer by day, amateur painter by night. Looking for someone who appreciates both logic and creativity.",
    "Passionate traveler and foodie. I've been to 15 countries and counting! Hope to find a partner for my next adventure.",
    "Nature lover who enjoys hiking and weekend camping trips. Family-oriented and looking for something meaningful.",
    "Lifelong learner and bookworm. Always curious about the world. Seeking someone kind and intellectually stimulating.",
    "Yoga enthusiast with a love for spicy food and classic cinema. Excited to meet someone who values health and happiness.",
];

const MALE_BIOS: &[&str] = &[
    "Entrepreneur with a passion for tech and fitness. Believe in hard work and having a good sense of humor.",
    "Architect who loves old buildings and modern art. Enjoy weekend cycles and cooking for friends.",
    "Data scientist who spends too much time thinking about AI. Looking for someone to share coffee and meaningful conversations.",
    "High school teacher and basketball coach. Love working with kids and being active outdoors.",
    "Musician and dog lover. Spend my free time playing guitar and exploring local parks. Seeking a kind soul.",
];

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Per-gender ranges for generated measurements
struct Template {
    gender: Gender,
    names: &'static [&'static str],
    bios: &'static [&'static str],
    photo_offset: usize,
    username_offset: usize,
    height: (f64, f64),
    weight: (f64, f64),
    max_siblings: i32,
    second_lines: &'static [&'static str],
}

const TEMPLATES: [Template; 2] = [
    Template {
        gender: Gender::Female,
        names: FEMALE_NAMES,
        bios: FEMALE_BIOS,
        photo_offset: 0,
        username_offset: 1,
        height: (155.0, 175.0),
        weight: (50.0, 70.0),
        max_siblings: 3,
        second_lines: &["Apt 4B", "Suite 102", "Unit 7", "", "Floor 2"],
    },
    Template {
        gender: Gender::Male,
        names: MALE_NAMES,
        bios: MALE_BIOS,
        photo_offset: 5,
        username_offset: 6,
        height: (170.0, 190.0),
        weight: (70.0, 90.0),
        max_siblings: 4,
        second_lines: &["Apt 12", "Suite 500", "", "Unit B", "P.O. Box 456"],
    },
];

fn pick<R: Rng>(rng: &mut R, values: &'static [&'static str]) -> &'static str {
    values.choose(rng).copied().unwrap_or_default()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn sample_profile<R: Rng>(rng: &mut R, template: &Template, index: usize, last_name: &str) -> ProfileChanges {
    let family_type = if rng.gen_bool(0.5) {
        FamilyType::Nuclear
    } else {
        FamilyType::Joint
    };
    let family_status = *[FamilyStatus::MiddleClass, FamilyStatus::UpperMiddleClass, FamilyStatus::Rich]
        .choose(rng)
        .unwrap_or(&FamilyStatus::MiddleClass);

    ProfileChanges {
        photo: Some(PHOTOS.get(index + template.photo_offset).map(|p| p.to_string())),
        gender: Some(template.gender),
        phone_number: Some(format!(
            "+1{}{}{}",
            rng.gen_range(200..=999),
            rng.gen_range(200..=999),
            rng.gen_range(1000..=9999)
        )),
        height: Some(Some(round2(rng.gen_range(template.height.0..=template.height.1)))),
        weight: Some(Some(round2(rng.gen_range(template.weight.0..=template.weight.1)))),
        address_line1: Some(format!(
            "{} {} {}",
            rng.gen_range(100..=9999),
            pick(rng, LAST_NAMES),
            pick(rng, STREET_TYPES)
        )),
        address_line2: Some(pick(rng, template.second_lines).to_string()),
        city: Some(pick(rng, CITIES).to_string()),
        state: Some(pick(rng, STATES).to_string()),
        country: Some("USA".to_string()),
        postal_code: Some(rng.gen_range(10000..=99999).to_string()),
        father_name: Some(format!("{} {}", pick(rng, MALE_NAMES), last_name)),
        mother_name: Some(format!("{} {}", pick(rng, FEMALE_NAMES), last_name)),
        siblings: Some(Some(rng.gen_range(0..=template.max_siblings))),
        family_type: Some(Some(family_type)),
        family_status: Some(Some(family_status)),
        bio: Some(template.bios.get(index).copied().unwrap_or_default().to_string()),
    }
}

/// Seed five female and five male sample profiles when the store has no accounts.
///
/// Returns the number of accounts created.
pub async fn seed_sample_profiles(store: &dyn Store) -> Result<usize, SeedError> {
    let existing = store.list_accounts(PageWindow { offset: 0, limit: 1 }).await?;
    if existing.total > 0 {
        tracing::info!("Store already has {} accounts, skipping sample data", existing.total);
        return Ok(0);
    }

    let password_hash = hash_password(SAMPLE_PASSWORD)?;
    let mut created = 0;

    for template in &TEMPLATES {
        for (index, first_name) in template.names.iter().enumerate() {
            // ThreadRng is not Send, so keep it out of the awaits
            let (account, profile) = {
                let mut rng = rand::thread_rng();
                let last_name = pick(&mut rng, LAST_NAMES);
                let username = format!("{}_{}", first_name.to_lowercase(), index + template.username_offset);
                let account = NewAccount {
                    email: format!("{}@example.com", username),
                    username,
                    password_hash: password_hash.clone(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    is_active: true,
                    is_staff: false,
                    is_superuser: false,
                    group_ids: Vec::new(),
                };
                (account, sample_profile(&mut rng, template, index, last_name))
            };

            store.create_account(account, Some(profile)).await?;
            created += 1;
        }
    }

    tracing::info!("Seeded {} sample profiles", created);

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DiscoveryScope, ProfileFilter};
    use crate::services::store::ProfileStore;
    use crate::services::MemoryStore;

    #[test]
    fn test_sample_profile_is_in_range() {
        let mut rng = rand::thread_rng();
        let profile = sample_profile(&mut rng, &TEMPLATES[1], 2, "Smith");

        assert_eq!(profile.gender, Some(Gender::Male));
        let height = profile.height.flatten().unwrap();
        assert!((170.0..=190.0).contains(&height));
        assert!(profile.father_name.unwrap().ends_with(" Smith"));
        assert_eq!(profile.photo.flatten().as_deref(), Some(PHOTOS[7]));
    }

    #[tokio::test]
    async fn test_seed_runs_once() {
        let store = MemoryStore::new();

        assert_eq!(seed_sample_profiles(&store).await.unwrap(), 10);
        assert_eq!(seed_sample_profiles(&store).await.unwrap(), 0);

        let all = store
            .list_profiles(&DiscoveryScope::All, &ProfileFilter::default(), PageWindow { offset: 0, limit: 50 })
            .await
            .unwrap();
        assert_eq!(all.total, 10);
    }
}
