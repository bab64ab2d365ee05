//! End-to-end cache behavior over the in-memory engine: hit and miss
//! accounting, write-path invalidation scope, and fresh reads when the
//! cache is disabled.

use std::sync::Arc;

use polizza::application::loader::{SeedLoader, demo_seed};
use polizza::application::mutations::{
    ClientPatch, DeleteMode, MutationService, NewClaim, NewPolicy,
};
use polizza::application::queries::QueryService;
use polizza::application::repos::{ClientsWriteRepo, CreateClientParams};
use polizza::cache::{
    CacheConfig, CacheStore, InvalidationRouter, MemoryBackend, PATTERN_ALL, QueryCache,
};
use polizza::infra::memory::MemoryRepositories;
use polizza::ranking::RankingIndex;

struct Stack {
    queries: QueryService,
    mutations: MutationService,
    store: Arc<CacheStore>,
    ranking: Arc<RankingIndex>,
    repositories: Arc<MemoryRepositories>,
}

fn build_stack(config: CacheConfig) -> (Stack, SeedLoader) {
    let repositories = Arc::new(MemoryRepositories::new());
    let backend = Arc::new(MemoryBackend::new(&config));
    let store = Arc::new(CacheStore::new(backend, config));
    let query_cache = Arc::new(QueryCache::new(store.clone()));
    let router = Arc::new(InvalidationRouter::new(store.clone()));
    let ranking = Arc::new(RankingIndex::new());

    let stack = Stack {
        queries: QueryService::new(repositories.clone(), query_cache, ranking.clone()),
        mutations: MutationService::new(
            repositories.clone(),
            repositories.clone(),
            router,
            ranking.clone(),
        ),
        store: store.clone(),
        ranking: ranking.clone(),
        repositories: repositories.clone(),
    };
    let loader = SeedLoader::new(repositories.clone(), repositories, store, ranking);
    (stack, loader)
}

async fn seeded_stack() -> Stack {
    let (stack, loader) = build_stack(CacheConfig::default());
    loader.load(demo_seed()).await.expect("demo seed loads");
    stack
}

/// Run every catalogued query once, priming all thirteen keys (twelve
/// namespaces, with two years under query8).
async fn prime_all_views(stack: &Stack) {
    stack.queries.active_clients().await.expect("query1");
    stack.queries.open_claims().await.expect("query2");
    stack.queries.insured_vehicles().await.expect("query3");
    stack
        .queries
        .clients_without_active_policies()
        .await
        .expect("query4");
    stack.queries.agent_policy_counts().await.expect("query5");
    stack.queries.expired_policies().await.expect("query6");
    stack.queries.top_clients_by_coverage().await.expect("query7");
    stack
        .queries
        .accident_claims_in_year(2023)
        .await
        .expect("query8 2023");
    stack
        .queries
        .accident_claims_in_year(2024)
        .await
        .expect("query8 2024");
    stack.queries.active_policies_sorted().await.expect("query9");
    stack.queries.suspended_policies().await.expect("query10");
    stack.queries.multi_vehicle_clients().await.expect("query11");
    stack.queries.agent_claim_counts().await.expect("query12");
}

fn new_life_policy() -> NewPolicy {
    NewPolicy {
        client_dni: "27999888".to_string(),
        kind: "life".to_string(),
        start_date: "01/07/2024".to_string(),
        end_date: "01/07/2025".to_string(),
        monthly_premium: 300.0,
        total_coverage: 250_000.0,
        agent_license: "MAT-007".to_string(),
        status: "active".to_string(),
        deductible: None,
        policy_number: None,
    }
}

#[tokio::test]
async fn second_read_is_served_from_cache() {
    let stack = seeded_stack().await;

    let first = stack.queries.active_clients().await.expect("first read");
    let second = stack.queries.active_clients().await.expect("second read");

    assert_eq!(first, second);
    assert_eq!(first.len(), 5);

    let stats = stack.store.stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert!(
        stack
            .store
            .keys(PATTERN_ALL)
            .await
            .contains(&"query1:active_clients".to_string())
    );
}

#[tokio::test]
async fn issuing_a_policy_drops_exactly_the_coverage_views() {
    let stack = seeded_stack().await;
    prime_all_views(&stack).await;
    assert_eq!(stack.store.keys(PATTERN_ALL).await.len(), 13);

    let issued = stack
        .mutations
        .issue_policy(new_life_policy())
        .await
        .expect("policy issues");
    assert_eq!(issued.policy.policy_number, "POL1161");

    let keys = stack.store.keys(PATTERN_ALL).await;
    assert_eq!(keys.len(), 9);
    for gone in [
        "query4:clients_no_active_policies",
        "query5:agent_policy_counts",
        "query7:top_clients_coverage",
        "query9:active_policies_sorted",
    ] {
        assert!(!keys.contains(&gone.to_string()), "{gone} should be gone");
    }
    for kept in [
        "query1:active_clients",
        "query2:open_claims",
        "query3:insured_vehicles",
        "query6:expired_policies",
        "query8:accident_claims_2023",
        "query8:accident_claims_2024",
        "query10:suspended_policies",
        "query11:multi_vehicle_clients",
        "query12:agent_claim_counts",
    ] {
        assert!(keys.contains(&kept.to_string()), "{kept} should survive");
    }

    // The ranking rebuilt off the new totals: Lucia now carries 500k.
    let top = stack
        .queries
        .top_clients_by_coverage()
        .await
        .expect("fresh ranking view");
    assert_eq!(top[0].client_id, 206);
    assert_eq!(top[0].total_coverage, 500_000.0);
}

#[tokio::test]
async fn filing_a_claim_drops_the_whole_year_family() {
    let stack = seeded_stack().await;
    prime_all_views(&stack).await;

    stack
        .mutations
        .create_claim(NewClaim {
            policy_number: "POL1153".to_string(),
            claim_id: 9095,
            kind: "accident".to_string(),
            date: "01/08/2024".to_string(),
            estimated_amount: 2_000.0,
            status: "open".to_string(),
            description: None,
            final_amount: None,
            resolution_date: None,
        })
        .await
        .expect("claim files");

    let keys = stack.store.keys(PATTERN_ALL).await;
    assert_eq!(keys.len(), 9);
    assert!(!keys.contains(&"query2:open_claims".to_string()));
    assert!(!keys.contains(&"query8:accident_claims_2023".to_string()));
    assert!(!keys.contains(&"query8:accident_claims_2024".to_string()));
    assert!(!keys.contains(&"query12:agent_claim_counts".to_string()));
    assert!(keys.contains(&"query6:expired_policies".to_string()));

    // Next read sees the new claim.
    let open = stack.queries.open_claims().await.expect("fresh claims view");
    assert!(open.iter().any(|row| row.claim_id == 9095));
}

#[tokio::test]
async fn stale_views_persist_until_a_service_level_write() {
    let stack = seeded_stack().await;

    let before = stack.queries.active_clients().await.expect("primed view");
    assert_eq!(before.len(), 5);

    // A write bypassing the mutation surface leaves the cached view
    // untouched: client 207 exists in the store but not in the view.
    stack
        .repositories
        .create_client(CreateClientParams {
            client_id: 207,
            first_name: "Ines".to_string(),
            last_name: "Molina".to_string(),
            dni: "26111333".to_string(),
            email: "ines.molina@example.com".to_string(),
            phone: None,
            city: None,
            active: true,
        })
        .await
        .expect("raw insert");
    let stale = stack.queries.active_clients().await.expect("cached view");
    assert_eq!(stale, before);

    // A service-level write drops the view; the next read picks up
    // both the raw insert and the soft delete.
    stack
        .mutations
        .delete_client(204, DeleteMode::Soft)
        .await
        .expect("soft delete");
    let fresh = stack.queries.active_clients().await.expect("fresh view");
    assert_eq!(fresh.len(), 5);
    assert!(!fresh.iter().any(|row| row.client_id == 204));
    assert!(fresh.iter().any(|row| row.client_id == 207));

    // The deactivated client comes back the same way.
    stack
        .mutations
        .update_client(
            204,
            ClientPatch {
                active: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("reactivate");
    let restored = stack.queries.active_clients().await.expect("restored view");
    assert_eq!(restored.len(), 6);
}

#[tokio::test]
async fn disabled_cache_always_computes_fresh() {
    let (stack, loader) = build_stack(CacheConfig {
        enabled: false,
        ..Default::default()
    });
    loader.load(demo_seed()).await.expect("demo seed loads");

    let first = stack.queries.active_clients().await.expect("first read");
    let second = stack.queries.active_clients().await.expect("second read");
    assert_eq!(first, second);

    let stats = stack.store.stats().await;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert!(stack.store.keys(PATTERN_ALL).await.is_empty());
}

#[tokio::test]
async fn year_keys_cache_independently() {
    let stack = seeded_stack().await;

    let of_2023 = stack
        .queries
        .accident_claims_in_year(2023)
        .await
        .expect("2023 view");
    let of_2024 = stack
        .queries
        .accident_claims_in_year(2024)
        .await
        .expect("2024 view");

    assert_eq!(of_2023.len(), 1);
    assert_eq!(of_2023[0].claim_id, 9003);
    assert_eq!(of_2024.len(), 2);

    let keys = stack.store.keys("query8:*").await;
    assert_eq!(keys.len(), 2);
}

#[tokio::test]
async fn namespace_flush_leaves_double_digit_namespaces_alone() {
    let stack = seeded_stack().await;
    stack.queries.active_clients().await.expect("query1");
    stack.queries.suspended_policies().await.expect("query10");
    stack.queries.multi_vehicle_clients().await.expect("query11");
    stack.queries.agent_claim_counts().await.expect("query12");

    let removed = stack
        .store
        .invalidate("query1:*")
        .await
        .expect("flush succeeds");

    assert_eq!(removed, 1);
    let keys = stack.store.keys(PATTERN_ALL).await;
    assert_eq!(keys.len(), 3);
    assert!(keys.contains(&"query10:suspended_policies".to_string()));
    assert!(keys.contains(&"query11:multi_vehicle_clients".to_string()));
    assert!(keys.contains(&"query12:agent_claim_counts".to_string()));
}

#[tokio::test]
async fn ranking_serves_the_cached_view_after_rebuilds() {
    let stack = seeded_stack().await;
    assert_eq!(stack.ranking.len(), 6);

    let top = stack
        .queries
        .top_clients_by_coverage()
        .await
        .expect("ranked view");
    assert_eq!(top.len(), 6);
    assert_eq!(top[0].rank, 1);
    assert_eq!(top[0].display_name, "Lucia Ferrari");
    assert_eq!(top[5].rank, 6);
    assert_eq!(top[5].client_id, 202);
}
