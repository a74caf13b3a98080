use crate::models::{Card, CardCreatedResponse, CardFilter, CardPatch};
use crate::repository::CardRepository;
use axum::http::StatusCode;
use database::{DocumentStore, RepositoryError};
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum CardError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid payload: {detail}")]
    InvalidPayload { status: StatusCode, detail: String },
    #[error("Database error: {0}")]
    Infrastructure(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Error creating document")]
    CreateFailed,
}

impl From<RepositoryError> for CardError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => CardError::NotFound("Card not found".into()),
            RepositoryError::Infrastructure(e) => CardError::Infrastructure(e.to_string()),
            _ => CardError::Infrastructure(err.to_string()),
        }
    }
}

pub struct CardService;

impl CardService {
    #[instrument(skip(db))]
    pub async fn list_cards(db: &dyn DocumentStore, filter: CardFilter) -> Result<Vec<Card>, CardError> {
        let repo = CardRepository::new(db);

        let cards = repo.list(&filter).await?;
        if cards.is_empty() {
            return Err(CardError::NotFound("Cards not found".into()));
        }
        Ok(cards)
    }

    #[instrument(skip(db))]
    pub async fn get_card(db: &dyn DocumentStore, id: &str) -> Result<Card, CardError> {
        let repo = CardRepository::new(db);

        repo.find_by_id(id)
            .await?
            .ok_or_else(|| CardError::NotFound("Card not found".into()))
    }

    #[instrument(skip(db))]
    pub async fn create_card(db: &dyn DocumentStore, card: Card) -> Result<CardCreatedResponse, CardError> {
        let repo = CardRepository::new(db);

        let id = repo.create(&card).await.map_err(|e| {
            tracing::error!(error = %e, "Error creating document");
            CardError::CreateFailed
        })?;

        tracing::info!(%id, "Card created");
        Ok(CardCreatedResponse::new(id))
    }

    /// Overwrites every field, then returns the card as stored.
    #[instrument(skip(db))]
    pub async fn replace_card(db: &dyn DocumentStore, id: &str, card: Card) -> Result<Card, CardError> {
        let repo = CardRepository::new(db);

        repo.replace(id, &card).await?;

        repo.find_by_id(id)
            .await?
            .ok_or_else(|| CardError::NotFound("Card not found".into()))
    }

    /// Writes only the supplied fields, then returns the card as stored.
    /// An empty patch is rejected before the card is looked up.
    #[instrument(skip(db))]
    pub async fn patch_card(db: &dyn DocumentStore, id: &str, patch: CardPatch) -> Result<Card, CardError> {
        if patch.is_empty() {
            return Err(CardError::InvalidInput("No fields provided for update".into()));
        }

        let repo = CardRepository::new(db);

        repo.merge(id, patch).await.map_err(|e| match e {
            RepositoryError::NotFound => CardError::NotFound("Document not found".into()),
            _ => e.into(),
        })?;

        repo.find_by_id(id)
            .await?
            .ok_or_else(|| CardError::NotFound("Document not found".into()))
    }

    #[instrument(skip(db))]
    pub async fn delete_card(db: &dyn DocumentStore, id: &str) -> Result<(), CardError> {
        let repo = CardRepository::new(db);

        repo.delete(id).await?;
        Ok(())
    }
}
