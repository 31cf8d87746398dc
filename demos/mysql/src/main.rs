use sqlx::MySqlPool;
use std::env;

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    let pool = MySqlPool::connect(&env::var("DATABASE_URL")?).await?;
    println!("{}", list_todos(&pool).await?);
    Ok(())
}

async fn list_todos(pool: &MySqlPool) -> anyhow::Result<String> {
    let recs: Vec<(i64, String, bool)> = sqlx::query_as(
        r#"
SELECT id, description, done
FROM todos
ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut todos = "".to_string();

    for (id, description, done) in recs {
        todos = format!(
            "{}{}",
            todos,
            format!(
                "- [{}] {}: {}\n",
                if done { "x" } else { " " },
                id,
                &description,
            )
        );
    }

    Ok(todos)
}
