use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string_null(Users::Login).unique_key())
                    .col(string(Users::Email).unique_key())
                    .col(string_null(Users::HashedPassword))
                    .col(boolean(Users::VerifiedEmail).default(false))
                    .col(string_null(Users::AvatarUrl))
                    .col(string_null(Users::AvatarSmallUrl))
                    .col(boolean(Users::IsAdmin).default(false))
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_verified_created_at")
                    .table(Users::Table)
                    .col(Users::VerifiedEmail)
                    .col(Users::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genres::Table)
                    .if_not_exists()
                    .col(pk_auto(Genres::Id))
                    .col(string(Genres::Name).unique_key())
                    .col(big_integer(Genres::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Actors::Table)
                    .if_not_exists()
                    .col(pk_auto(Actors::Id))
                    .col(string(Actors::Name))
                    .col(string_null(Actors::AvatarUrl))
                    .col(string(Actors::WikiUrl).default(""))
                    .col(big_integer(Actors::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Films::Table)
                    .if_not_exists()
                    .col(pk_auto(Films::Id))
                    .col(string(Films::Title))
                    .col(text(Films::Synopsis))
                    .col(string(Films::ReleaseDate))
                    .col(integer(Films::Runtime))
                    .col(string(Films::Producer))
                    .col(string_null(Films::PosterUrl))
                    .col(big_integer(Films::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_films_release_date")
                    .table(Films::Table)
                    .col(Films::ReleaseDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FilmGenres::Table)
                    .if_not_exists()
                    .col(integer(FilmGenres::FilmId))
                    .col(integer(FilmGenres::GenreId))
                    .primary_key(Index::create().col(FilmGenres::FilmId).col(FilmGenres::GenreId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_genres_film")
                            .from(FilmGenres::Table, FilmGenres::FilmId)
                            .to(Films::Table, Films::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_genres_genre")
                            .from(FilmGenres::Table, FilmGenres::GenreId)
                            .to(Genres::Table, Genres::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FilmActors::Table)
                    .if_not_exists()
                    .col(integer(FilmActors::FilmId))
                    .col(integer(FilmActors::ActorId))
                    .primary_key(Index::create().col(FilmActors::FilmId).col(FilmActors::ActorId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_actors_film")
                            .from(FilmActors::Table, FilmActors::FilmId)
                            .to(Films::Table, Films::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_actors_actor")
                            .from(FilmActors::Table, FilmActors::ActorId)
                            .to(Actors::Table, Actors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_actors_actor")
                    .table(FilmActors::Table)
                    .col(FilmActors::ActorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FilmStats::Table)
                    .if_not_exists()
                    .col(integer(FilmStats::FilmId).primary_key())
                    .col(double(FilmStats::AvgRating).default(0.0))
                    .col(integer(FilmStats::TotalReviews).default(0))
                    .col(integer(FilmStats::Count0To20).default(0))
                    .col(integer(FilmStats::Count21To40).default(0))
                    .col(integer(FilmStats::Count41To60).default(0))
                    .col(integer(FilmStats::Count61To80).default(0))
                    .col(integer(FilmStats::Count81To100).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_stats_film")
                            .from(FilmStats::Table, FilmStats::FilmId)
                            .to(Films::Table, Films::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(FilmStats::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(FilmActors::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(FilmGenres::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Films::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Actors::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Genres::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Login,
    Email,
    HashedPassword,
    VerifiedEmail,
    AvatarUrl,
    AvatarSmallUrl,
    IsAdmin,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Genres {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Actors {
    Table,
    Id,
    Name,
    AvatarUrl,
    WikiUrl,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Films {
    Table,
    Id,
    Title,
    Synopsis,
    ReleaseDate,
    Runtime,
    Producer,
    PosterUrl,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FilmGenres {
    Table,
    FilmId,
    GenreId,
}

#[derive(DeriveIden)]
enum FilmActors {
    Table,
    FilmId,
    ActorId,
}

#[derive(DeriveIden)]
enum FilmStats {
    Table,
    FilmId,
    AvgRating,
    TotalReviews,
    #[sea_orm(iden = "count_0_20")]
    Count0To20,
    #[sea_orm(iden = "count_21_40")]
    Count21To40,
    #[sea_orm(iden = "count_41_60")]
    Count41To60,
    #[sea_orm(iden = "count_61_80")]
    Count61To80,
    #[sea_orm(iden = "count_81_100")]
    Count81To100,
}
