//! Postgres-backed [`ListingStore`] and [`DogCatalog`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dobie_core::{Dog, DogFilters, DogView, NormalizedListing, Photo, SearchRun, Shelter};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::warn;

use crate::{DogCatalog, DogQuery, ListingStore, StoreError};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn upsert_shelter(conn: &mut PgConnection, shelter: &Shelter) -> Result<String, StoreError> {
    let id = sqlx::query_scalar::<_, String>(
        r#"
        INSERT INTO shelters (
            id, source, client_id, name, address_line1, city, state, zip,
            phone, email, website_url, location_label, location_address_html, ingested_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (source, client_id) DO UPDATE SET
            name = EXCLUDED.name,
            address_line1 = EXCLUDED.address_line1,
            city = EXCLUDED.city,
            state = EXCLUDED.state,
            zip = EXCLUDED.zip,
            phone = EXCLUDED.phone,
            email = EXCLUDED.email,
            website_url = EXCLUDED.website_url,
            location_label = EXCLUDED.location_label,
            location_address_html = EXCLUDED.location_address_html,
            ingested_at = EXCLUDED.ingested_at
        RETURNING id
        "#,
    )
    .bind(&shelter.id)
    .bind(&shelter.source)
    .bind(&shelter.client_id)
    .bind(&shelter.name)
    .bind(&shelter.address_line1)
    .bind(&shelter.city)
    .bind(&shelter.state)
    .bind(&shelter.zip)
    .bind(&shelter.phone)
    .bind(&shelter.email)
    .bind(&shelter.website_url)
    .bind(&shelter.location_label)
    .bind(&shelter.location_address_html)
    .bind(shelter.ingested_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn upsert_dog(conn: &mut PgConnection, dog: &Dog) -> Result<String, StoreError> {
    let id = sqlx::query_scalar::<_, String>(
        r#"
        INSERT INTO dogs (
            id, source, source_animal_id, client_id, name, full_name, animal_type,
            primary_breed, secondary_breed, breed1, breed2, breed_display,
            age, age_display, gender, size_category,
            description_html, bio_html, more_info_html, placement_info,
            weight_lbs, status, shelter_id, cover_image_url, located_at, brought_to_shelter,
            city, state, lat, lon, filter_breed_group, client_sort,
            listing_url, source_api_url, data_updated_note,
            filter_age, filter_gender, filter_size, filter_dob, filter_days_out, filter_primary_breed,
            ingested_at, source_updated_at, raw_payload
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7,
            $8, $9, $10, $11, $12,
            $13, $14, $15, $16,
            $17, $18, $19, $20,
            $21, $22, $23, $24, $25, $26,
            $27, $28, $29, $30, $31, $32,
            $33, $34, $35,
            $36, $37, $38, $39, $40, $41,
            $42, $43, $44
        )
        ON CONFLICT (source, source_animal_id, client_id) DO UPDATE SET
            name = EXCLUDED.name,
            full_name = EXCLUDED.full_name,
            animal_type = EXCLUDED.animal_type,
            primary_breed = EXCLUDED.primary_breed,
            secondary_breed = EXCLUDED.secondary_breed,
            breed1 = EXCLUDED.breed1,
            breed2 = EXCLUDED.breed2,
            breed_display = EXCLUDED.breed_display,
            age = EXCLUDED.age,
            age_display = EXCLUDED.age_display,
            gender = EXCLUDED.gender,
            size_category = EXCLUDED.size_category,
            description_html = EXCLUDED.description_html,
            bio_html = EXCLUDED.bio_html,
            more_info_html = EXCLUDED.more_info_html,
            placement_info = EXCLUDED.placement_info,
            weight_lbs = EXCLUDED.weight_lbs,
            status = EXCLUDED.status,
            shelter_id = EXCLUDED.shelter_id,
            cover_image_url = EXCLUDED.cover_image_url,
            located_at = EXCLUDED.located_at,
            brought_to_shelter = EXCLUDED.brought_to_shelter,
            city = EXCLUDED.city,
            state = EXCLUDED.state,
            lat = EXCLUDED.lat,
            lon = EXCLUDED.lon,
            filter_breed_group = EXCLUDED.filter_breed_group,
            client_sort = EXCLUDED.client_sort,
            listing_url = EXCLUDED.listing_url,
            source_api_url = EXCLUDED.source_api_url,
            data_updated_note = EXCLUDED.data_updated_note,
            filter_age = EXCLUDED.filter_age,
            filter_gender = EXCLUDED.filter_gender,
            filter_size = EXCLUDED.filter_size,
            filter_dob = EXCLUDED.filter_dob,
            filter_days_out = EXCLUDED.filter_days_out,
            filter_primary_breed = EXCLUDED.filter_primary_breed,
            ingested_at = EXCLUDED.ingested_at,
            source_updated_at = EXCLUDED.source_updated_at,
            raw_payload = EXCLUDED.raw_payload
        RETURNING id
        "#,
    )
    .bind(&dog.id)
    .bind(&dog.source)
    .bind(&dog.source_animal_id)
    .bind(&dog.client_id)
    .bind(&dog.name)
    .bind(&dog.full_name)
    .bind(&dog.animal_type)
    .bind(&dog.primary_breed)
    .bind(&dog.secondary_breed)
    .bind(&dog.breed1)
    .bind(&dog.breed2)
    .bind(&dog.breed_display)
    .bind(&dog.age)
    .bind(&dog.age_display)
    .bind(&dog.gender)
    .bind(&dog.size_category)
    .bind(&dog.description_html)
    .bind(&dog.bio_html)
    .bind(&dog.more_info_html)
    .bind(&dog.placement_info)
    .bind(dog.weight_lbs)
    .bind(&dog.status)
    .bind(&dog.shelter_id)
    .bind(&dog.cover_image_url)
    .bind(&dog.located_at)
    .bind(&dog.brought_to_shelter)
    .bind(&dog.city)
    .bind(&dog.state)
    .bind(dog.lat)
    .bind(dog.lon)
    .bind(&dog.filter_breed_group)
    .bind(dog.client_sort)
    .bind(&dog.listing_url)
    .bind(&dog.source_api_url)
    .bind(&dog.data_updated_note)
    .bind(&dog.filters.filter_age)
    .bind(&dog.filters.filter_gender)
    .bind(&dog.filters.filter_size)
    .bind(&dog.filters.filter_dob)
    .bind(dog.filters.filter_days_out)
    .bind(&dog.filters.filter_primary_breed)
    .bind(dog.ingested_at)
    .bind(dog.source_updated_at)
    .bind(Json(&dog.raw_payload))
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn replace_photos(
    conn: &mut PgConnection,
    dog_id: &str,
    photos: &[Photo],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM photos WHERE dog_id = $1")
        .bind(dog_id)
        .execute(&mut *conn)
        .await?;

    for photo in photos {
        sqlx::query(
            r#"
            INSERT INTO photos (id, dog_id, url, is_primary, position, source, ingested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&photo.id)
        .bind(dog_id)
        .bind(&photo.url)
        .bind(photo.is_primary)
        .bind(photo.position)
        .bind(&photo.source)
        .bind(photo.ingested_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn link_run(
    conn: &mut PgConnection,
    run_id: &str,
    dog_id: &str,
    dog: &Dog,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO search_results (search_run_id, dog_id, source_animal_id, client_id, ingested_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (search_run_id, dog_id) DO NOTHING
        "#,
    )
    .bind(run_id)
    .bind(dog_id)
    .bind(&dog.source_animal_id)
    .bind(&dog.client_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn persist_in_tx(
    conn: &mut PgConnection,
    run_id: &str,
    mut listing: NormalizedListing,
) -> Result<String, StoreError> {
    let shelter_id = upsert_shelter(conn, &listing.shelter).await?;
    listing.dog.shelter_id = shelter_id;
    let dog_id = upsert_dog(conn, &listing.dog).await?;
    replace_photos(conn, &dog_id, &listing.photos).await?;
    link_run(conn, run_id, &dog_id, &listing.dog).await?;
    Ok(dog_id)
}

#[async_trait]
impl ListingStore for PgStore {
    async fn start_run(&self, run: &SearchRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO search_runs (id, zip_postal, breed, animal_type, search_url, started_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&run.id)
        .bind(&run.zip_postal)
        .bind(&run.breed)
        .bind(&run.animal_type)
        .bind(&run.search_url)
        .bind(run.started_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_run(&self, run_id: &str, completed_at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE search_runs SET completed_at = $1 WHERE id = $2")
            .bind(completed_at)
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownRun(run_id.to_string()));
        }
        Ok(())
    }

    async fn persist_listing(
        &self,
        run_id: &str,
        listing: NormalizedListing,
    ) -> Result<String, StoreError> {
        let mut tx = self.pool.begin().await?;
        match persist_in_tx(&mut tx, run_id, listing).await {
            Ok(dog_id) => {
                tx.commit().await?;
                Ok(dog_id)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[derive(Debug, FromRow)]
struct DogRow {
    id: String,
    source: String,
    source_animal_id: String,
    client_id: String,
    name: String,
    full_name: Option<String>,
    animal_type: String,
    primary_breed: Option<String>,
    secondary_breed: Option<String>,
    breed1: Option<String>,
    breed2: Option<String>,
    breed_display: Option<String>,
    age: Option<String>,
    age_display: Option<String>,
    gender: Option<String>,
    size_category: Option<String>,
    description_html: Option<String>,
    bio_html: Option<String>,
    more_info_html: Option<String>,
    placement_info: Option<String>,
    weight_lbs: Option<f64>,
    status: Option<String>,
    shelter_id: String,
    cover_image_url: Option<String>,
    located_at: Option<String>,
    brought_to_shelter: Option<String>,
    city: Option<String>,
    state: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    filter_breed_group: Option<String>,
    client_sort: Option<i64>,
    listing_url: String,
    source_api_url: String,
    data_updated_note: Option<String>,
    filter_age: Option<String>,
    filter_gender: Option<String>,
    filter_size: Option<String>,
    filter_dob: Option<String>,
    filter_days_out: Option<i32>,
    filter_primary_breed: Option<String>,
    ingested_at: DateTime<Utc>,
    source_updated_at: Option<DateTime<Utc>>,
    raw_payload: serde_json::Value,
}

impl From<DogRow> for Dog {
    fn from(row: DogRow) -> Self {
        Self {
            id: row.id,
            source: row.source,
            source_animal_id: row.source_animal_id,
            client_id: row.client_id,
            name: row.name,
            full_name: row.full_name,
            animal_type: row.animal_type,
            primary_breed: row.primary_breed,
            secondary_breed: row.secondary_breed,
            breed1: row.breed1,
            breed2: row.breed2,
            breed_display: row.breed_display,
            age: row.age,
            age_display: row.age_display,
            gender: row.gender,
            size_category: row.size_category,
            description_html: row.description_html,
            bio_html: row.bio_html,
            more_info_html: row.more_info_html,
            placement_info: row.placement_info,
            weight_lbs: row.weight_lbs,
            status: row.status,
            shelter_id: row.shelter_id,
            cover_image_url: row.cover_image_url,
            located_at: row.located_at,
            brought_to_shelter: row.brought_to_shelter,
            city: row.city,
            state: row.state,
            lat: row.lat,
            lon: row.lon,
            filter_breed_group: row.filter_breed_group,
            client_sort: row.client_sort,
            listing_url: row.listing_url,
            source_api_url: row.source_api_url,
            data_updated_note: row.data_updated_note,
            filters: DogFilters {
                filter_age: row.filter_age,
                filter_gender: row.filter_gender,
                filter_size: row.filter_size,
                filter_dob: row.filter_dob,
                filter_days_out: row.filter_days_out,
                filter_primary_breed: row.filter_primary_breed,
            },
            ingested_at: row.ingested_at,
            source_updated_at: row.source_updated_at,
            raw_payload: row.raw_payload,
        }
    }
}

#[derive(Debug, FromRow)]
struct ShelterRow {
    id: String,
    source: String,
    client_id: String,
    name: String,
    address_line1: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    website_url: Option<String>,
    location_label: Option<String>,
    location_address_html: Option<String>,
    ingested_at: DateTime<Utc>,
}

impl From<ShelterRow> for Shelter {
    fn from(row: ShelterRow) -> Self {
        Self {
            id: row.id,
            source: row.source,
            client_id: row.client_id,
            name: row.name,
            address_line1: row.address_line1,
            city: row.city,
            state: row.state,
            zip: row.zip,
            phone: row.phone,
            email: row.email,
            website_url: row.website_url,
            location_label: row.location_label,
            location_address_html: row.location_address_html,
            ingested_at: row.ingested_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PhotoRow {
    id: String,
    dog_id: String,
    url: String,
    is_primary: bool,
    position: i32,
    source: String,
    ingested_at: DateTime<Utc>,
}

impl From<PhotoRow> for Photo {
    fn from(row: PhotoRow) -> Self {
        Self {
            id: row.id,
            dog_id: row.dog_id,
            url: row.url,
            is_primary: row.is_primary,
            position: row.position,
            source: row.source,
            ingested_at: row.ingested_at,
        }
    }
}

fn push_dog_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &DogQuery) {
    if let Some(q) = &query.q {
        let token = format!("%{q}%");
        qb.push(" AND (d.name ILIKE ")
            .push_bind(token.clone())
            .push(" OR d.primary_breed ILIKE ")
            .push_bind(token.clone())
            .push(" OR d.secondary_breed ILIKE ")
            .push_bind(token.clone())
            .push(" OR d.description_html ILIKE ")
            .push_bind(token.clone())
            .push(" OR s.name ILIKE ")
            .push_bind(token)
            .push(")");
    }
    if let Some(breed) = &query.breed {
        qb.push(" AND d.primary_breed ILIKE ")
            .push_bind(format!("%{breed}%"));
    }
    let exact = [
        ("d.age", &query.age),
        ("d.gender", &query.gender),
        ("d.size_category", &query.size),
        ("d.status", &query.status),
        ("d.client_id", &query.client_id),
        ("d.source_animal_id", &query.source_animal_id),
    ];
    for (column, value) in exact {
        if let Some(value) = value {
            qb.push(format!(" AND {column} = ")).push_bind(value.clone());
        }
    }
}

impl PgStore {
    async fn hydrate(&self, dogs: Vec<Dog>) -> Result<Vec<DogView>, StoreError> {
        if dogs.is_empty() {
            return Ok(Vec::new());
        }
        let dog_ids = dogs.iter().map(|d| d.id.clone()).collect::<Vec<_>>();
        let shelter_ids = dogs.iter().map(|d| d.shelter_id.clone()).collect::<Vec<_>>();

        let shelters = sqlx::query_as::<_, ShelterRow>("SELECT * FROM shelters WHERE id = ANY($1)")
            .bind(&shelter_ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| (row.id.clone(), Shelter::from(row)))
            .collect::<HashMap<_, _>>();

        let mut photos: HashMap<String, Vec<Photo>> = HashMap::new();
        let rows = sqlx::query_as::<_, PhotoRow>(
            "SELECT * FROM photos WHERE dog_id = ANY($1) ORDER BY dog_id, position ASC",
        )
        .bind(&dog_ids)
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            photos.entry(row.dog_id.clone()).or_default().push(Photo::from(row));
        }

        Ok(dogs
            .into_iter()
            .map(|dog| {
                let shelter = shelters.get(&dog.shelter_id);
                let dog_photos = photos.get(&dog.id).map(Vec::as_slice).unwrap_or(&[]);
                DogView::assemble(dog, shelter, dog_photos)
            })
            .collect())
    }
}

#[async_trait]
impl DogCatalog for PgStore {
    async fn list_dogs(&self, query: &DogQuery) -> Result<Vec<DogView>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT d.* FROM dogs d LEFT JOIN shelters s ON s.id = d.shelter_id WHERE TRUE",
        );
        push_dog_filters(&mut qb, query);
        qb.push(" ORDER BY d.ingested_at DESC, d.id ASC LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        let dogs = qb
            .build_query_as::<DogRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Dog::from)
            .collect::<Vec<_>>();
        self.hydrate(dogs).await
    }

    async fn get_dog(&self, id: &str) -> Result<Option<DogView>, StoreError> {
        let row = sqlx::query_as::<_, DogRow>("SELECT * FROM dogs WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(self.hydrate(vec![Dog::from(row)]).await?.into_iter().next())
    }
}
