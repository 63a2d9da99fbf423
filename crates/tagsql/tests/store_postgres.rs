//! Store round trips against a real database.
//!
//! Set `DATABASE_URL` (directly or in `.env`) to run these; without it every
//! test returns early.

use std::time::Duration;
use tagsql::types::NullString;
use tagsql::{OrmError, Query, Record, Store, StoreConfig, args};

const TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS tagsql_it_game (
    id bigserial PRIMARY KEY,
    game_id bigint NOT NULL,
    game_title text NOT NULL,
    game_description text,
    enabled boolean NOT NULL DEFAULT false,
    create_date timestamptz,
    write_date timestamptz
)";

#[derive(Debug, Default, Record)]
#[record(table = "tagsql_it_game")]
struct Game {
    #[tag(sql = "game_id")]
    id: i64,
    #[tag(sql = "game_title")]
    title: String,
    #[tag(sql = "game_description")]
    description: NullString,
    #[tag(sql = "enabled")]
    enabled: bool,
}

async fn store() -> Option<Store> {
    dotenvy::dotenv().ok();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let config = StoreConfig::new(url)
        .timeout(Duration::from_secs(10))
        .retry_count(1)
        .max_connections(4);
    let store = Store::connect(config).expect("pool");
    let ctx = store.begin_context();
    store.exec(&ctx, TABLE_DDL, &[]).await.expect("create table");
    Some(store)
}

#[tokio::test]
async fn insert_commit_and_read_back() -> Result<(), OrmError> {
    let Some(store) = store().await else {
        return Ok(());
    };
    let ctx = store.begin_context();
    let game = Game {
        id: 90_507,
        title: "DOTA2".to_string(),
        description: NullString::new("Froze".to_string()),
        enabled: true,
    };

    let stmt = Query::new().insert(&game).to_sql()?;
    let tx = store.begin_transaction(&ctx).await?;
    let id: i64 = store
        .exec_with_returned_id(&ctx, &tx, stmt.sql(), &stmt.params_ref())
        .await?;
    store.commit(&ctx, tx).await?;
    assert!(id > 0);

    let mut title = String::new();
    store
        .query_row(
            &ctx,
            |row| {
                title = row.try_get(0)?;
                Ok(())
            },
            "SELECT game_title FROM tagsql_it_game WHERE id = $1",
            &[&id],
        )
        .await?;
    assert_eq!(title, "DOTA2");

    store
        .exec(&ctx, "DELETE FROM tagsql_it_game WHERE id = $1", &[&id])
        .await?;
    Ok(())
}

#[tokio::test]
async fn update_affects_rows_and_rollback_discards() -> Result<(), OrmError> {
    let Some(store) = store().await else {
        return Ok(());
    };
    let ctx = store.begin_context();
    let game = Game {
        id: 90_508,
        title: "Artifact".to_string(),
        ..Default::default()
    };

    let insert = Query::new().insert(&game).to_sql()?;
    let tx = store.begin_transaction(&ctx).await?;
    let id: i64 = store
        .exec_with_returned_id(&ctx, &tx, insert.sql(), &insert.params_ref())
        .await?;
    store.commit(&ctx, tx).await?;

    let update = Query::new()
        .updates(&Game {
            title: "Artifact Classic".to_string(),
            ..Default::default()
        })
        .where_clause("id = ?", args![id])
        .to_sql()?;
    let tx = store.begin_transaction(&ctx).await?;
    let n = store
        .exec_affecting_rows(&ctx, &tx, update.sql(), &update.params_ref())
        .await?;
    assert_eq!(n, 1);
    store.rollback(&ctx, tx).await?;

    let mut titles = Vec::new();
    store
        .query(
            &ctx,
            |row| {
                titles.push(row.try_get::<_, String>(0)?);
                Ok(())
            },
            "SELECT game_title FROM tagsql_it_game WHERE id = $1",
            &[&id],
        )
        .await?;
    assert_eq!(titles, ["Artifact"]);

    store
        .exec(&ctx, "DELETE FROM tagsql_it_game WHERE id = $1", &[&id])
        .await?;
    Ok(())
}

#[tokio::test]
async fn missing_row_leaves_output_untouched() -> Result<(), OrmError> {
    let Some(store) = store().await else {
        return Ok(());
    };
    let ctx = store.begin_context();
    let mut title = "unchanged".to_string();
    store
        .query_row(
            &ctx,
            |row| {
                title = row.try_get(0)?;
                Ok(())
            },
            "SELECT game_title FROM tagsql_it_game WHERE id = -1",
            &[],
        )
        .await?;
    assert_eq!(title, "unchanged");
    Ok(())
}

#[tokio::test]
async fn with_transaction_hands_over_the_tx() -> Result<(), OrmError> {
    let Some(store) = store().await else {
        return Ok(());
    };
    let ctx = store.begin_context();
    let count: i64 = store
        .with_transaction(&ctx, |tx| {
            let store = store.clone();
            async move {
                let ctx = store.begin_context();
                let row = tagsql::GenericClient::query_one(
                    &tx,
                    "SELECT count(*) FROM tagsql_it_game",
                    &[],
                )
                .await?;
                store.commit(&ctx, tx).await?;
                Ok::<_, OrmError>(row.try_get(0)?)
            }
        })
        .await?;
    assert!(count >= 0);
    Ok(())
}

async fn insert_games(store: &Store, games: &[Game]) -> Result<Vec<i64>, OrmError> {
    let ctx = store.begin_context();
    let mut ids = Vec::with_capacity(games.len());
    for game in games {
        let stmt = Query::new().insert(game).to_sql()?;
        let tx = store.begin_transaction(&ctx).await?;
        ids.push(
            store
                .exec_with_returned_id(&ctx, &tx, stmt.sql(), &stmt.params_ref())
                .await?,
        );
        store.commit(&ctx, tx).await?;
    }
    Ok(ids)
}

#[tokio::test]
async fn scan_reporting_not_found_is_swallowed() -> Result<(), OrmError> {
    let Some(store) = store().await else {
        return Ok(());
    };
    let ctx = store.begin_context();
    let game = |id| Game {
        id,
        title: "Dota Underlords".to_string(),
        ..Default::default()
    };
    let ids = insert_games(&store, &[game(90_509), game(90_510)]).await?;

    store
        .query_row(
            &ctx,
            |_| Err(OrmError::not_found("no such game")),
            "SELECT game_title FROM tagsql_it_game WHERE id = $1",
            &[&ids[0]],
        )
        .await?;

    // the first not-found scan ends the iteration
    let mut scanned = 0;
    store
        .query(
            &ctx,
            |_| {
                scanned += 1;
                Err(OrmError::not_found("no such game"))
            },
            "SELECT game_title FROM tagsql_it_game WHERE id = ANY($1) ORDER BY id",
            &[&ids],
        )
        .await?;
    assert_eq!(scanned, 1);

    store
        .exec(&ctx, "DELETE FROM tagsql_it_game WHERE id = ANY($1)", &[&ids])
        .await?;
    Ok(())
}

#[tokio::test]
async fn other_scan_errors_propagate() -> Result<(), OrmError> {
    let Some(store) = store().await else {
        return Ok(());
    };
    let ctx = store.begin_context();
    let ids = insert_games(
        &store,
        &[Game {
            id: 90_511,
            title: "Artifact 2.0".to_string(),
            ..Default::default()
        }],
    )
    .await?;

    let err = store
        .query_row(
            &ctx,
            |_| Err(OrmError::decode("game_title", "not a title")),
            "SELECT game_title FROM tagsql_it_game WHERE id = $1",
            &[&ids[0]],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Decode { .. }));

    let err = store
        .query(
            &ctx,
            |_| Err(OrmError::validation("rejected")),
            "SELECT game_title FROM tagsql_it_game WHERE id = $1",
            &[&ids[0]],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));

    // a decode failure from the row itself surfaces too
    let err = store
        .query_row(
            &ctx,
            |row| {
                let _: i64 = row.try_get(0)?;
                Ok(())
            },
            "SELECT game_title FROM tagsql_it_game WHERE id = $1",
            &[&ids[0]],
        )
        .await
        .unwrap_err();
    assert!(!err.is_not_found());

    store
        .exec(&ctx, "DELETE FROM tagsql_it_game WHERE id = ANY($1)", &[&ids])
        .await?;
    Ok(())
}
