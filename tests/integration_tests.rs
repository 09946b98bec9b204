// Integration tests: core operations against the in-memory store

use matrimony::core::{
    my_interests, register, toggle_interest, update_me, DiscoveryScope, InterestError, MissingProfilePolicy,
    PageWindow, ProfileFilter, ProfileUpdate, ProfileUpdateError, Registration, RegistrationError, UpdateMode,
    Viewer,
};
use matrimony::models::{AccountId, Gender, Role};
use matrimony::services::{
    AccountChanges, IdentityStore, MemoryStore, NewAccount, ProfileChanges, ProfileStore,
};
use std::sync::Arc;
use tokio::sync::Barrier;

const WINDOW: PageWindow = PageWindow { offset: 0, limit: 100 };

fn registration(email: &str, gender: Gender) -> Registration {
    Registration {
        email: email.to_string(),
        password_hash: "hash".to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        phone_number: "+14155550100".to_string(),
        gender,
    }
}

async fn registered(store: &MemoryStore, email: &str, gender: Gender) -> AccountId {
    register(store, registration(email, gender)).await.unwrap().id
}

async fn viewer(store: &MemoryStore, id: AccountId) -> Viewer {
    let account = store.get_account(id).await.unwrap().unwrap();
    let profile = store.get_profile(id).await.unwrap();
    Viewer {
        account_id: id,
        role: account.role(),
        profile_gender: profile.map(|r| r.profile.gender),
    }
}

async fn discover(store: &MemoryStore, id: AccountId) -> Vec<AccountId> {
    let scope = DiscoveryScope::for_viewer(&viewer(store, id).await, MissingProfilePolicy::Unfiltered);
    store
        .list_profiles(&scope, &ProfileFilter::default(), WINDOW)
        .await
        .unwrap()
        .items
        .iter()
        .map(|r| r.id())
        .collect()
}

#[tokio::test]
async fn test_discovery_excludes_self_and_same_gender() {
    let store = MemoryStore::new();
    let alice = registered(&store, "alice@example.com", Gender::Female).await;
    let beth = registered(&store, "beth@example.com", Gender::Female).await;
    let carl = registered(&store, "carl@example.com", Gender::Male).await;
    let dan = registered(&store, "dan@example.com", Gender::Male).await;

    let seen = discover(&store, alice).await;
    assert!(!seen.contains(&alice));
    assert!(!seen.contains(&beth));
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&carl) && seen.contains(&dan));

    let seen = discover(&store, carl).await;
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&alice) && seen.contains(&beth));
}

#[tokio::test]
async fn test_staff_discovery_sees_all() {
    let store = MemoryStore::new();
    let admin = registered(&store, "admin@example.com", Gender::Male).await;
    registered(&store, "bob@example.com", Gender::Male).await;
    registered(&store, "cara@example.com", Gender::Female).await;

    store
        .update_account(
            admin,
            &AccountChanges {
                is_staff: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let v = viewer(&store, admin).await;
    assert_eq!(v.role, Role::Admin);
    assert_eq!(discover(&store, admin).await.len(), 3);
}

#[tokio::test]
async fn test_register_twice_reports_existing_email() {
    let store = MemoryStore::new();
    registered(&store, "a@x.com", Gender::Female).await;

    let err = register(&store, registration("a@x.com", Gender::Male)).await.unwrap_err();
    assert!(matches!(err, RegistrationError::EmailTaken));
    assert_eq!(err.to_string(), "Email already exists");
}

#[tokio::test]
async fn test_register_creates_profile_with_gender_and_phone() {
    let store = MemoryStore::new();
    let id = registered(&store, "a@x.com", Gender::Female).await;

    let account = store.get_account(id).await.unwrap().unwrap();
    assert_eq!(account.username, "a@x.com");

    let record = store.get_profile(id).await.unwrap().unwrap();
    assert_eq!(record.profile.gender, Some(Gender::Female));
    assert_eq!(record.profile.phone_number, "+14155550100");
    assert!(record.interests.is_empty());
}

#[tokio::test]
async fn test_register_picks_fresh_username_when_taken() {
    let store = MemoryStore::new();
    store
        .create_account(
            NewAccount {
                username: "a@x.com".to_string(),
                email: String::new(),
                password_hash: "!".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                is_active: true,
                is_staff: false,
                is_superuser: false,
                group_ids: vec![],
            },
            None,
        )
        .await
        .unwrap();

    let id = registered(&store, "a@x.com", Gender::Male).await;
    let username = store.get_account(id).await.unwrap().unwrap().username;

    assert!(username.starts_with("a_"));
    assert_eq!(username.len(), "a_".len() + 6);
}

#[tokio::test]
async fn test_toggle_twice_restores_state() {
    let store = MemoryStore::new();
    let a = registered(&store, "a@x.com", Gender::Female).await;
    let b = registered(&store, "b@x.com", Gender::Male).await;

    let first = toggle_interest(&store, a, Some(b)).await.unwrap();
    assert!(first.is_interested);
    assert_eq!(first.message(), "Interest expressed");
    assert!(store.has_interest(a, b).await.unwrap());

    let second = toggle_interest(&store, a, Some(b)).await.unwrap();
    assert!(!second.is_interested);
    assert_eq!(second.message(), "Interest removed");
    assert!(!store.has_interest(a, b).await.unwrap());
}

#[tokio::test]
async fn test_toggle_is_directed() {
    let store = MemoryStore::new();
    let a = registered(&store, "a@x.com", Gender::Female).await;
    let b = registered(&store, "b@x.com", Gender::Male).await;

    toggle_interest(&store, b, Some(a)).await.unwrap();
    toggle_interest(&store, a, Some(b)).await.unwrap();
    toggle_interest(&store, a, Some(b)).await.unwrap();

    assert!(store.has_interest(b, a).await.unwrap());
    assert!(!store.has_interest(a, b).await.unwrap());
}

#[tokio::test]
async fn test_toggle_rejections() {
    let store = MemoryStore::new();
    let a = registered(&store, "a@x.com", Gender::Female).await;

    assert!(matches!(toggle_interest(&store, a, None).await, Err(InterestError::MissingTarget)));
    assert!(matches!(toggle_interest(&store, a, Some(0)).await, Err(InterestError::MissingTarget)));
    assert!(matches!(
        toggle_interest(&store, a, Some(999)).await,
        Err(InterestError::TargetNotFound)
    ));
    assert!(matches!(toggle_interest(&store, a, Some(a)).await, Err(InterestError::SelfInterest)));
    assert_eq!(
        InterestError::SelfInterest.to_string(),
        "You cannot express interest in your own profile"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_never_duplicate() {
    let store = Arc::new(MemoryStore::new());
    let a = registered(&store, "a@x.com", Gender::Female).await;
    let b = registered(&store, "b@x.com", Gender::Male).await;
    let barrier = Arc::new(Barrier::new(10));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                toggle_interest(store.as_ref(), a, Some(b)).await
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => outcomes.push(outcome.is_interested),
            Err(e) => panic!("concurrent toggle failed: {}", e),
        }
    }

    // Adds and removes alternate under the store lock
    assert_eq!(outcomes.iter().filter(|added| **added).count(), 5);
    // An even number of flips leaves no edge
    assert!(!store.has_interest(a, b).await.unwrap());
    let record = store.get_profile(a).await.unwrap().unwrap();
    assert!(record.interests.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_from_many_viewers() {
    let store = Arc::new(MemoryStore::new());
    let target = registered(&store, "target@x.com", Gender::Female).await;
    let mut viewers = Vec::new();
    for i in 0..8 {
        viewers.push(registered(&store, &format!("v{}@x.com", i), Gender::Male).await);
    }
    let barrier = Arc::new(Barrier::new(viewers.len()));

    let handles: Vec<_> = viewers
        .iter()
        .map(|&viewer| {
            let store = store.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                toggle_interest(store.as_ref(), viewer, Some(target)).await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_interested);
    }
    for viewer in viewers {
        assert!(store.has_interest(viewer, target).await.unwrap());
        assert!(!store.has_interest(target, viewer).await.unwrap());
    }
}

#[tokio::test]
async fn test_my_interests_lists_targets() {
    let store = MemoryStore::new();
    let a = registered(&store, "a@x.com", Gender::Female).await;
    let b = registered(&store, "b@x.com", Gender::Male).await;
    let c = registered(&store, "c@x.com", Gender::Male).await;

    let empty = my_interests(&store, a, WINDOW).await.unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.items.is_empty());

    toggle_interest(&store, a, Some(b)).await.unwrap();
    toggle_interest(&store, a, Some(c)).await.unwrap();

    let listing = my_interests(&store, a, WINDOW).await.unwrap();
    assert_eq!(listing.total, 2);
    // Newest profile first
    assert_eq!(listing.items.iter().map(|r| r.id()).collect::<Vec<_>>(), vec![c, b]);
}

#[tokio::test]
async fn test_deleting_profile_removes_edges() {
    let store = MemoryStore::new();
    let a = registered(&store, "a@x.com", Gender::Female).await;
    let b = registered(&store, "b@x.com", Gender::Male).await;

    toggle_interest(&store, a, Some(b)).await.unwrap();
    toggle_interest(&store, b, Some(a)).await.unwrap();

    assert!(store.delete_profile(b).await.unwrap());
    assert!(!store.has_interest(a, b).await.unwrap());
    assert_eq!(my_interests(&store, a, WINDOW).await.unwrap().total, 0);
}

fn full_update(city: &str) -> ProfileUpdate {
    ProfileUpdate {
        account: AccountChanges {
            first_name: Some("Ann".to_string()),
            ..Default::default()
        },
        profile: ProfileChanges {
            gender: Some(Gender::Female),
            phone_number: Some("+14155550101".to_string()),
            city: Some(city.to_string()),
            height: Some(Some(165.5)),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_update_me_is_idempotent() {
    let store = MemoryStore::new();
    let a = registered(&store, "a@x.com", Gender::Female).await;
    let update = full_update("Boston");

    let first = update_me(&store, a, &update, UpdateMode::Full).await.unwrap();
    let second = update_me(&store, a, &update, UpdateMode::Full).await.unwrap();

    assert_eq!(first.profile.city, "Boston");
    assert_eq!(first.owner.first_name, "Ann");
    assert_eq!(first.profile.city, second.profile.city);
    assert_eq!(first.profile.height, second.profile.height);
    assert_eq!(first.owner, second.owner);
}

#[tokio::test]
async fn test_update_me_creates_missing_profile() {
    let store = MemoryStore::new();
    let id = store
        .create_account(
            NewAccount {
                username: "solo".to_string(),
                email: "solo@x.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                is_active: true,
                is_staff: false,
                is_superuser: false,
                group_ids: vec![],
            },
            None,
        )
        .await
        .unwrap()
        .id;
    assert!(store.get_profile(id).await.unwrap().is_none());

    let record = update_me(&store, id, &full_update("Denver"), UpdateMode::Full).await.unwrap();
    assert_eq!(record.id(), id);
    assert_eq!(record.profile.city, "Denver");
}

#[tokio::test]
async fn test_update_me_full_requires_gender_and_phone() {
    let store = MemoryStore::new();
    let a = registered(&store, "a@x.com", Gender::Female).await;
    let update = ProfileUpdate {
        profile: ProfileChanges {
            city: Some("Austin".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let err = update_me(&store, a, &update, UpdateMode::Full).await.unwrap_err();
    assert_eq!(err.to_string(), "Missing required fields: gender, phone_number");

    let record = update_me(&store, a, &update, UpdateMode::Partial).await.unwrap();
    assert_eq!(record.profile.city, "Austin");
    assert_eq!(record.profile.gender, Some(Gender::Female));
}

#[tokio::test]
async fn test_update_me_email_collision_changes_nothing() {
    let store = MemoryStore::new();
    let a = registered(&store, "a@x.com", Gender::Female).await;
    registered(&store, "b@x.com", Gender::Male).await;

    let before_account = store.get_account(a).await.unwrap().unwrap();
    let before_profile = store.get_profile(a).await.unwrap().unwrap();

    let mut update = full_update("Seattle");
    update.account.email = Some("b@x.com".to_string());

    let err = update_me(&store, a, &update, UpdateMode::Full).await.unwrap_err();
    assert!(matches!(err, ProfileUpdateError::EmailTaken));

    assert_eq!(store.get_account(a).await.unwrap().unwrap(), before_account);
    assert_eq!(store.get_profile(a).await.unwrap().unwrap(), before_profile);
}
