//! Migration seed tests
//!
//! These need a PostgreSQL database named by `TEST_DATABASE_URL`; run them
//! with `cargo test -- --ignored`.

mod common;

use common::migrated_pool;
use shared::SystemRole;

#[tokio::test]
#[ignore] // Requires database connection
async fn test_seeded_roles_match_system_roles() {
    let pool = migrated_pool().await;

    for role in SystemRole::ALL {
        let mut seeded = sqlx::query_scalar::<_, String>(
            r#"
            SELECT CONCAT(p.resource, ':', p.action)
            FROM roles r
            JOIN role_permissions rp ON rp.role_id = r.id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE r.name = $1
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&pool)
        .await
        .expect("role permissions");
        seeded.sort();

        let mut expected = role.permissions();
        expected.sort();

        assert_eq!(seeded, expected, "permissions of role {}", role.as_str());
    }
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_system_roles_are_flagged() {
    let pool = migrated_pool().await;

    let flagged = sqlx::query_scalar::<_, String>(
        "SELECT name FROM roles WHERE is_system_role ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .expect("roles");

    assert_eq!(flagged, vec!["admin", "manager", "viewer"]);
}
