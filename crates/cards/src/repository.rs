use crate::models::{Card, CardFilter, CardPatch, PHONE, STATUS};
use database::{DocumentStore, FieldFilter, RepositoryError};

pub(crate) const COLLECTION: &str = "tarjetas_lealtad";

fn field_filters(filter: &CardFilter) -> Vec<FieldFilter> {
    [(STATUS, &filter.status), (PHONE, &filter.phone)]
        .into_iter()
        .filter_map(|(field, value)| match value.as_deref() {
            Some(v) if !v.is_empty() => Some(FieldFilter::eq(field, v)),
            _ => None,
        })
        .collect()
}

pub(crate) struct CardRepository<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> CardRepository<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, card: &Card) -> Result<String, RepositoryError> {
        let data = serde_json::to_value(card)?;
        self.store.insert(COLLECTION, data).await
    }

    pub async fn list(&self, filter: &CardFilter) -> Result<Vec<Card>, RepositoryError> {
        let docs = self.store.query(COLLECTION, &field_filters(filter)).await?;

        docs.into_iter()
            .map(|doc| Ok(serde_json::from_value(doc.data)?))
            .collect()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Card>, RepositoryError> {
        match self.store.get(COLLECTION, id).await? {
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    pub async fn replace(&self, id: &str, card: &Card) -> Result<(), RepositoryError> {
        let data = serde_json::to_value(card)?;
        self.store.replace(COLLECTION, id, data).await
    }

    pub async fn merge(&self, id: &str, patch: CardPatch) -> Result<(), RepositoryError> {
        self.store.merge(COLLECTION, id, patch.into_fields()).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.store.delete(COLLECTION, id).await
    }
}
