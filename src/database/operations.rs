/// Bulk insertion of reading batches
use async_trait::async_trait;

use crate::database::connection::connect;
use crate::models::ReadingRecord;
use crate::pipeline::ReadingSink;

/// Write an entire batch inside one transaction: either every row lands or
/// none of them do.
pub async fn insert_reading_batch(
    client: &mut tokio_postgres::Client,
    rows: &[ReadingRecord],
) -> Result<(), tokio_postgres::Error> {
    let transaction = client.transaction().await?;

    let statement = transaction
        .prepare(
            "INSERT INTO readings(recorded_at, source, rssi, temp_c, hum_pct, press_hpa,
                                  batt_mv, flags, seq, motion0, motion1,
                                  batt_pct, uptime_min, dew_point_c, location)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .await?;

    for row in rows {
        transaction
            .execute(
                &statement,
                &[
                    &row.recorded_at,
                    &row.source,
                    &row.rssi,
                    &row.temp_c,
                    &row.hum_pct,
                    &row.press_hpa,
                    &row.batt_mv,
                    &row.flags,
                    &row.seq,
                    &row.motion0,
                    &row.motion1,
                    &row.batt_pct,
                    &row.uptime_min,
                    &row.dew_point_c,
                    &row.location,
                ],
            )
            .await?;
    }

    transaction.commit().await?;
    Ok(())
}

/// PostgreSQL-backed reading sink. Connects per batch; a failed write is
/// reported to the caller, which discards the batch.
pub struct PostgresSink {
    database_url: String,
}

impl PostgresSink {
    pub fn new(database_url: String) -> Self {
        PostgresSink { database_url }
    }
}

#[async_trait]
impl ReadingSink for PostgresSink {
    async fn insert_batch(&self, rows: Vec<ReadingRecord>) -> Result<(), String> {
        let mut client = connect(&self.database_url).await?;
        insert_reading_batch(&mut client, &rows)
            .await
            .map_err(|e| format!("bulk insert error: {}", e))
    }
}
