use deploy::{DeployConfig, DeployError, Environment, InMemoryPlatform, PlatformCall, Promoter};
use futures::future::join_all;
use std::collections::HashSet;

const REPO: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com/delivery-time";
const STAGE_ROLE: &str = "arn:aws:iam::111111111111:role/deploy-stage";
const PROD_ROLE: &str = "arn:aws:iam::222222222222:role/deploy-prod";
const FUNCTION: &str = "delivery-time-inference";
const ALIAS: &str = "live";

fn platform() -> InMemoryPlatform {
    InMemoryPlatform::new()
        .with_function(STAGE_ROLE, FUNCTION, ALIAS)
        .with_function(PROD_ROLE, FUNCTION, ALIAS)
}

fn promoter(platform: &InMemoryPlatform, guard: bool) -> Promoter {
    let config = DeployConfig::new(REPO, FUNCTION, ALIAS, STAGE_ROLE, PROD_ROLE)
        .with_alias_guard(guard);
    Promoter::new(config, Box::new(platform.clone()), Box::new(platform.clone()))
        .expect("promoter")
}

fn images_published(platform: &InMemoryPlatform) -> Vec<(String, String)> {
    platform
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            PlatformCall::PublishImage {
                role_arn,
                image_uri,
                ..
            } => Some((role_arn, image_uri)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_stage_then_prod_release() {
    let platform = platform();
    let promoter = promoter(&platform, true);

    let stage = promoter.promote_str("stage", "a1b2c3").await.expect("stage");
    let prod = promoter.promote_str("prod", "a1b2c3").await.expect("prod");

    assert_eq!(stage.environment, Environment::Stage);
    assert_eq!(prod.environment, Environment::Prod);
    assert_eq!(
        images_published(&platform),
        vec![
            (STAGE_ROLE.to_string(), format!("{}:a1b2c3", REPO)),
            (PROD_ROLE.to_string(), format!("{}:a1b2c3", REPO)),
        ]
    );

    for (role, report) in [(STAGE_ROLE, &stage), (PROD_ROLE, &prod)] {
        let alias = platform.alias(role, FUNCTION, ALIAS).expect("alias");
        assert_eq!(alias.function_version, report.published_version);
    }
}

#[tokio::test]
async fn test_unknown_environment_never_touches_aliases() {
    let platform = platform();
    let promoter = promoter(&platform, false);
    let before_stage = platform.alias(STAGE_ROLE, FUNCTION, ALIAS);
    let before_prod = platform.alias(PROD_ROLE, FUNCTION, ALIAS);

    for env in ["", "dev", "Stage", "production"] {
        let err = promoter.promote_str(env, "a1b2c3").await.unwrap_err();
        assert!(matches!(err, DeployError::UnknownEnvironment { .. }));
    }

    assert!(platform.calls().is_empty());
    assert_eq!(platform.alias(STAGE_ROLE, FUNCTION, ALIAS), before_stage);
    assert_eq!(platform.alias(PROD_ROLE, FUNCTION, ALIAS), before_prod);
}

const VERSIONS: [&str; 3] = ["aaa111", "bbb222", "ccc333"];

fn call_kinds(platform: &InMemoryPlatform) -> Vec<&'static str> {
    platform
        .calls()
        .iter()
        .map(|call| match call {
            PlatformCall::AssumeRole { .. } => "assume",
            PlatformCall::GetAlias { .. } => "get",
            PlatformCall::PublishImage { .. } => "publish",
            PlatformCall::UpdateAlias { .. } => "update",
        })
        .collect()
}

fn assert_all_published_before_any_update(platform: &InMemoryPlatform) {
    let kinds = call_kinds(platform);
    let last_publish = kinds.iter().rposition(|k| *k == "publish").expect("publishes");
    let first_update = kinds.iter().position(|k| *k == "update").expect("updates");
    assert!(
        last_publish < first_update,
        "promotions did not interleave: {:?}",
        kinds
    );
}

#[tokio::test]
async fn test_overlapping_unguarded_promotions_last_writer_wins() {
    let platform = platform();
    platform.hold_after_publish(VERSIONS.len());
    let promoter = promoter(&platform, false);

    let results = join_all(
        VERSIONS
            .iter()
            .map(|version| promoter.promote(Environment::Stage, version)),
    )
    .await;

    let reports: Vec<_> = results
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("all promotions succeed");
    let versions: HashSet<_> = reports.iter().map(|r| r.published_version.clone()).collect();
    assert_eq!(versions.len(), 3, "each promotion publishes its own version");
    assert_all_published_before_any_update(&platform);

    let last_update = platform
        .calls()
        .into_iter()
        .rev()
        .find_map(|call| match call {
            PlatformCall::UpdateAlias { version, .. } => Some(version),
            _ => None,
        })
        .expect("an alias update");
    let alias = platform.alias(STAGE_ROLE, FUNCTION, ALIAS).expect("alias");
    assert_eq!(alias.function_version, last_update);
}

#[tokio::test]
async fn test_overlapping_guarded_promotions_let_one_win() {
    let platform = platform();
    platform.hold_after_publish(VERSIONS.len());
    let promoter = promoter(&platform, true);

    let results = join_all(
        VERSIONS
            .iter()
            .map(|version| promoter.promote(Environment::Stage, version)),
    )
    .await;
    assert_all_published_before_any_update(&platform);

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for result in results {
        match result {
            Ok(report) => winners.push(report),
            Err(DeployError::AliasLagging { source, .. }) => {
                assert!(
                    matches!(*source, DeployError::AliasConflict { .. }),
                    "unexpected cause: {}",
                    source
                );
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 2);
    assert_eq!(platform.published_versions(STAGE_ROLE, FUNCTION).len(), 4);

    let alias = platform.alias(STAGE_ROLE, FUNCTION, ALIAS).expect("alias");
    assert_eq!(alias.function_version, winners[0].published_version);
}
