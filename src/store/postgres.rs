use async_trait::async_trait;
use sqlx::{
    postgres::PgRow,
    types::Json,
    Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::{BidAcceptance, ChatStore, RideFilter, RideMutation, RideStore};
use crate::{
    entities::{sort_bids, Bid, BidStatus, ChatMessage, Ride, RideStatus},
    error::{
        bid_not_found_error, invalid_status_error, ride_not_bidding_error, ride_not_found_error,
        Error,
    },
};

type Database = Postgres;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    /// Creates the tables and indexes the store needs when they are missing.
    #[tracing::instrument(name = "PgStore::new", skip_all)]
    pub async fn new(pool: Pool<Database>) -> Result<Self, Error> {
        pool.execute(
            "CREATE TABLE IF NOT EXISTS rides (id UUID PRIMARY KEY, passenger_id UUID NOT NULL, driver_id UUID, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
        )
        .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS rides_status_idx ON rides (status, created_at)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS rides_passenger_idx ON rides (passenger_id, created_at)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS rides_driver_idx ON rides (driver_id, created_at)")
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS bids (id UUID PRIMARY KEY, ride_id UUID NOT NULL, driver_id UUID NOT NULL, price INT8 NOT NULL, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_bid_ride FOREIGN KEY(ride_id) REFERENCES rides(id))")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS bids_ride_idx ON bids (ride_id)")
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS chat_messages (id UUID PRIMARY KEY, ride_id UUID NOT NULL, user_id UUID NOT NULL, text TEXT NOT NULL, created_at TIMESTAMPTZ NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS chat_messages_ride_idx ON chat_messages (ride_id, created_at)")
            .await?;

        Ok(Self { pool })
    }
}

#[tracing::instrument(skip(tx))]
async fn fetch_ride_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Ride, Error> {
    let Json(ride): Json<Ride> = sqlx::query("SELECT data FROM rides WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(ride_not_found_error)?
        .try_get("data")?;

    Ok(ride)
}

#[tracing::instrument(skip(tx))]
async fn fetch_bid_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Bid, Error> {
    let Json(bid): Json<Bid> = sqlx::query("SELECT data FROM bids WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(bid_not_found_error)?
        .try_get("data")?;

    Ok(bid)
}

/// Writes `ride` only if its row still has status `expected`. Returns whether
/// the row was written.
#[tracing::instrument(skip(tx, ride), fields(ride_id = %ride.id))]
async fn update_ride_if(
    tx: &mut Transaction<'_, Database>,
    ride: &Ride,
    expected: RideStatus,
) -> Result<bool, Error> {
    let result = sqlx::query(
        "UPDATE rides SET status = $2, driver_id = $3, data = $4 WHERE id = $1 AND status = $5",
    )
    .bind(&ride.id)
    .bind(ride.status.name())
    .bind(ride.driver_id())
    .bind(Json(ride))
    .bind(expected.name())
    .execute(&mut *tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[tracing::instrument(skip(tx, bid), fields(bid_id = %bid.id))]
async fn update_bid(tx: &mut Transaction<'_, Database>, bid: &Bid) -> Result<(), Error> {
    sqlx::query("UPDATE bids SET status = $2, data = $3 WHERE id = $1")
        .bind(&bid.id)
        .bind(bid.status.name())
        .bind(Json(bid))
        .execute(&mut *tx)
        .await?;

    Ok(())
}

fn ride_from_row(row: &PgRow) -> Result<Ride, Error> {
    let Json(ride): Json<Ride> = row.try_get("data")?;
    Ok(ride)
}

#[async_trait]
impl RideStore for PgStore {
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO rides (id, passenger_id, driver_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&ride.id)
        .bind(&ride.passenger_id)
        .bind(ride.driver_id())
        .bind(ride.status.name())
        .bind(&ride.created_at)
        .bind(Json(ride))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let maybe_row = sqlx::query("SELECT data FROM rides WHERE id = $1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;

        maybe_row.as_ref().map(ride_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_rides(&self, filter: RideFilter, limit: i64) -> Result<Vec<Ride>, Error> {
        let query = match filter {
            RideFilter::Open => sqlx::query(
                "SELECT data FROM rides WHERE status = ANY($1) ORDER BY created_at DESC LIMIT $2",
            )
            .bind(
                RideStatus::OPEN
                    .iter()
                    .map(|s| s.name().to_string())
                    .collect::<Vec<String>>(),
            ),
            RideFilter::Passenger(id) => sqlx::query(
                "SELECT data FROM rides WHERE passenger_id = $1 ORDER BY created_at DESC LIMIT $2",
            )
            .bind(id),
            RideFilter::Driver(id) => sqlx::query(
                "SELECT data FROM rides WHERE driver_id = $1 ORDER BY created_at DESC LIMIT $2",
            )
            .bind(id),
        };

        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        rows.iter().map(ride_from_row).collect()
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn update_ride(&self, id: Uuid, mutation: RideMutation) -> Result<Ride, Error> {
        let mut tx = self.pool.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &id).await?;
        let previous = ride.status;

        if let Err(err) = mutation(&mut ride) {
            tx.rollback().await?;
            return Err(err);
        }

        if !update_ride_if(&mut tx, &ride, previous).await? {
            tx.rollback().await?;
            return Err(invalid_status_error());
        }

        tx.commit().await?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self, bid, mutation), fields(ride_id = %bid.ride_id, bid_id = %bid.id))]
    async fn insert_bid(&self, bid: &Bid, mutation: RideMutation) -> Result<Ride, Error> {
        let mut tx = self.pool.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &bid.ride_id).await?;
        let previous = ride.status;

        if let Err(err) = mutation(&mut ride) {
            tx.rollback().await?;
            return Err(err);
        }

        if ride.status != previous && !update_ride_if(&mut tx, &ride, previous).await? {
            tx.rollback().await?;
            return Err(ride_not_bidding_error());
        }

        sqlx::query(
            "INSERT INTO bids (id, ride_id, driver_id, price, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&bid.id)
        .bind(&bid.ride_id)
        .bind(&bid.driver_id)
        .bind(bid.price)
        .bind(bid.status.name())
        .bind(&bid.created_at)
        .bind(Json(bid))
        .execute(&mut tx)
        .await?;

        tx.commit().await?;

        Ok(ride)
    }

    #[tracing::instrument(skip(self, acceptance))]
    async fn accept_bid(
        &self,
        ride_id: Uuid,
        bid_id: Uuid,
        acceptance: BidAcceptance,
    ) -> Result<Ride, Error> {
        let mut tx = self.pool.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &ride_id).await?;
        let mut bid = fetch_bid_for_update(&mut tx, &bid_id).await?;
        let previous = ride.status;

        if let Err(err) = acceptance(&mut ride, &bid) {
            tx.rollback().await?;
            return Err(err);
        }

        // conditioned on the locked status; a concurrent acceptance that got
        // here first leaves zero affected rows
        if !update_ride_if(&mut tx, &ride, previous).await? {
            tx.rollback().await?;
            return Err(ride_not_bidding_error());
        }

        bid.status = BidStatus::Accepted;
        update_bid(&mut tx, &bid).await?;

        let rejected = sqlx::query(
            "UPDATE bids SET status = $3, data = jsonb_set(data, '{status}', to_jsonb($3::text)) WHERE ride_id = $1 AND id <> $2 AND status = $4",
        )
        .bind(&ride_id)
        .bind(&bid_id)
        .bind(BidStatus::Rejected.name())
        .bind(BidStatus::Pending.name())
        .execute(&mut tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::info!(rejected, "bid accepted, remaining bids rejected");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn list_bids(&self, ride_id: Uuid) -> Result<Vec<Bid>, Error> {
        let rows = sqlx::query(
            "SELECT data FROM bids WHERE ride_id = $1 ORDER BY price ASC, created_at ASC, id ASC",
        )
        .bind(&ride_id)
        .fetch_all(&self.pool)
        .await?;

        let mut bids = rows
            .iter()
            .map(|row| -> Result<Bid, Error> {
                let Json(bid): Json<Bid> = row.try_get("data")?;
                Ok(bid)
            })
            .collect::<Result<Vec<Bid>, Error>>()?;

        // timestamps round-trip through JSON, keep the order identical to memory
        sort_bids(&mut bids);

        Ok(bids)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    #[tracing::instrument(skip(self, message), fields(ride_id = %message.ride_id))]
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO chat_messages (id, ride_id, user_id, text, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&message.id)
        .bind(&message.ride_id)
        .bind(&message.user_id)
        .bind(&message.text)
        .bind(&message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_messages(&self, ride_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>, Error> {
        let rows = sqlx::query(
            "SELECT id, ride_id, user_id, text, created_at FROM (SELECT * FROM chat_messages WHERE ride_id = $1 ORDER BY created_at DESC LIMIT $2) recent ORDER BY created_at ASC",
        )
        .bind(&ride_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ChatMessage, Error> {
                Ok(ChatMessage {
                    id: row.try_get("id")?,
                    ride_id: row.try_get("ride_id")?,
                    user_id: row.try_get("user_id")?,
                    text: row.try_get("text")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
