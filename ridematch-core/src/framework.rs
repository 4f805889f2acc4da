use sqlx::PgPool;

/// Entry point for the `Processor` query structs in [`crate::entities`].
///
/// Single-statement reads and writes go through `DatabaseProcessor`; the
/// multi-statement atomic units in [`crate::store::postgres`] open their own
/// transactions and call the `*_tx` helpers on the entity types.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
