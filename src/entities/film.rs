use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "films")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub synopsis: String,
    /// ISO `YYYY-MM-DD`, compared lexicographically.
    pub release_date: String,
    /// Minutes.
    pub runtime: i32,
    pub producer: String,
    pub poster_url: Option<String>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::film_genre::Entity")]
    FilmGenre,
    #[sea_orm(has_many = "super::film_actor::Entity")]
    FilmActor,
    #[sea_orm(has_one = "super::film_stats::Entity")]
    FilmStats,
    #[sea_orm(has_many = "super::review::Entity")]
    Review,
}

impl Related<super::film_stats::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FilmStats.def()
    }
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Review.def()
    }
}

impl Related<super::genre::Entity> for Entity {
    fn to() -> RelationDef {
        super::film_genre::Relation::Genre.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::film_genre::Relation::Film.def().rev())
    }
}

impl Related<super::actor::Entity> for Entity {
    fn to() -> RelationDef {
        super::film_actor::Relation::Actor.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::film_actor::Relation::Film.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
