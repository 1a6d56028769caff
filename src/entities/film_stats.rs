use sea_orm::entity::prelude::*;

/// Derived from review rows; only the review repository writes it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "film_stats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub film_id: i32,
    #[sea_orm(column_type = "Double")]
    pub avg_rating: f64,
    pub total_reviews: i32,
    #[sea_orm(column_name = "count_0_20")]
    pub count_0_to_20: i32,
    #[sea_orm(column_name = "count_21_40")]
    pub count_21_to_40: i32,
    #[sea_orm(column_name = "count_41_60")]
    pub count_41_to_60: i32,
    #[sea_orm(column_name = "count_61_80")]
    pub count_61_to_80: i32,
    #[sea_orm(column_name = "count_81_100")]
    pub count_81_to_100: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::film::Entity",
        from = "Column::FilmId",
        to = "super::film::Column::Id",
        on_delete = "Cascade"
    )]
    Film,
}

impl Related<super::film::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Film.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
