//! Statements built from derived records.

use chrono::{TimeZone, Utc};
use tagsql::types::{NullInt64, NullString};
use tagsql::{OrmError, PageParams, Pagination, Query, Record, Value, args, compile, extract};

#[derive(Debug, Default, Record)]
#[record(table = "ref_game")]
struct Game {
    #[tag(sql = "game_id", json = "id")]
    id: i64,
    #[tag(sql = "game_title", json = "title")]
    title: String,
    #[tag(sql = "game_description")]
    description: NullString,
    #[tag(sql = "enabled")]
    enabled: bool,
    #[tag(sql = "release_date")]
    released: Option<chrono::DateTime<Utc>>,
    #[tag(sql = "player_ids")]
    players: Vec<String>,
    // never extracted
    cached_score: f64,
}

#[derive(Debug, Default, Record)]
#[record(table = "ref_category")]
struct Category {
    #[tag(sql = "category_id")]
    id: i64,
    #[tag(sql = "name")]
    name: String,
    #[tag(sql = "parent_id")]
    parent: NullInt64,
    #[tag(sql = "bad\\name")]
    broken: String,
}

fn dota() -> Game {
    Game {
        id: 507,
        title: "DOTA2".to_string(),
        enabled: true,
        ..Default::default()
    }
}

#[test]
fn derived_field_table_keeps_declaration_order() {
    let idents: Vec<_> = Game::fields().iter().map(|f| f.ident).collect();
    assert_eq!(
        idents,
        ["id", "title", "description", "enabled", "released", "players"]
    );
    assert_eq!(Game::TABLE, "ref_game");
    assert_eq!(Game::fields()[0].tag("json"), Some("id"));
    assert_eq!(Game::fields()[2].tag("json"), None);
}

#[test]
fn extract_skips_zero_and_untagged_fields() {
    let game = Game {
        description: NullString::new(String::new()),
        released: Some(Utc.with_ymd_and_hms(2013, 7, 9, 12, 0, 0).unwrap()),
        players: vec!["a".to_string(), "b".to_string()],
        cached_score: 9.5,
        ..dota()
    };
    let fields = extract("sql", &game);
    assert_eq!(
        fields.names(),
        [
            "game_id",
            "game_title",
            "game_description",
            "enabled",
            "release_date",
            "player_ids"
        ]
    );
    assert_eq!(fields.get("game_description").unwrap().encoded(), "");
    assert_eq!(
        fields.get("release_date").unwrap().encoded(),
        "2013-07-09T12:00:00Z"
    );
    assert_eq!(fields.get("player_ids").unwrap().encoded(), "[a b]");

    let json = extract("json", &game);
    assert_eq!(json.names(), ["id", "title"]);
}

#[test]
fn extract_drops_invalid_tag_names() {
    let category = Category {
        id: 3,
        name: "moba".to_string(),
        parent: NullInt64::new(0),
        broken: "x".to_string(),
    };
    let fields = extract("sql", &category);
    assert_eq!(fields.names(), ["category_id", "name", "parent_id"]);
    assert_eq!(fields.get("parent_id").unwrap().value, Value::Int(0));
}

#[test]
fn select_join_where() {
    let stmt = Query::new()
        .select(&dota())
        .join(&Category::default(), "category_id", "category_id")
        .where_clause("refGame.game_id = ?", args![507_i64])
        .to_sql()
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "SELECT refGame.enabled, refGame.game_id, refGame.game_title FROM ref_game refGame \
         INNER JOIN ref_category refCategory ON refCategory.category_id = refGame.category_id \
         WHERE refGame.game_id = $1"
    );
    assert_eq!(stmt.len(), 1);
}

#[test]
fn insert_returns_id() {
    let stmt = Query::new().insert(&dota()).to_sql().unwrap();
    assert_eq!(
        stmt.sql(),
        "INSERT INTO ref_game (enabled, game_id, game_title, create_date, write_date) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id"
    );
    assert_eq!(stmt.len(), 5);
    assert!(stmt.sql().contains(tagsql::RETURNING_ID));
}

#[test]
fn bulk_insert_numbers_across_rows() {
    let games = [dota(), Game { id: 508, ..dota() }];
    let stmt = Query::new().inserts(&games).to_sql().unwrap();
    assert_eq!(
        stmt.sql(),
        "INSERT INTO ref_game (enabled, game_id, game_title, create_date, write_date) \
         VALUES ($1, $2, $3, $4, $5), ($6, $7, $8, $9, $10) RETURNING id"
    );
    assert_eq!(stmt.len(), 10);
}

#[test]
fn update_with_where() {
    let stmt = Query::new()
        .updates(&dota())
        .where_clause("game_id = ?", args![507_i64])
        .to_sql()
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "UPDATE ref_game SET enabled = $2, game_id = $3, game_title = $4, write_date = $1 \
         WHERE game_id = $5"
    );
    assert_eq!(stmt.len(), 5);
}

#[test]
fn misuse_is_reported_at_finalize() {
    let err = Query::new()
        .join(&Category::default(), "category_id", "category_id")
        .to_sql()
        .unwrap_err();
    assert!(matches!(err, OrmError::Misuse(_)));

    let err = Query::new().inserts::<Game>(&[]).to_sql().unwrap_err();
    assert!(err.is_misuse());
}

#[test]
fn pagination_over_a_built_select() {
    let base = Query::new().select(&dota()).to_sql().unwrap();
    let paging = Pagination::new(base.sql())
        .params(PageParams::parse(
            "q=dota&filters[enabled:eq]=true&sort=-game_id&page=3&size=5",
        ))
        .allow_fields(["game_title", "enabled", "game_id"])
        .default_field("game_title")
        .alias("a");
    let stmt = compile(&paging).unwrap();
    assert_eq!(
        stmt.sql(),
        format!(
            "SELECT * FROM ({}) AS a WHERE ( a.game_title ILIKE '%' || $1 || '%' ) \
             AND a.enabled = $2 ORDER BY a.game_id DESC LIMIT 5 OFFSET 10",
            base.sql()
        )
    );
    assert_eq!(stmt.len(), 2);
    assert_eq!(paging.page(), 3);
    assert_eq!(paging.size(), 5);
}
