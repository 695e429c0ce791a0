use sqlx::PgPool;

use crate::db::types::MembershipStatus;

pub(crate) async fn is_enrolled(
    pool: &PgPool,
    student_id: &str,
    test_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (\
            SELECT 1 FROM tests t \
            JOIN class_memberships m ON m.class_id = t.class_id \
            WHERE t.id = $1 AND m.student_id = $2 AND m.status = $3\
        )",
    )
    .bind(test_id)
    .bind(student_id)
    .bind(MembershipStatus::Active)
    .fetch_one(pool)
    .await
}
