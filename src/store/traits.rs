use crate::model::{
    Compound, CompoundInstance, Id, InventoryCountSession, ListParams, Page, Transaction, User,
};
use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;

/// Collections shared with the generic JSON REST store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Compounds,
    CompoundInstances,
    Transactions,
    CountSessions,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Compounds,
        Collection::CompoundInstances,
        Collection::Transactions,
        Collection::CountSessions,
        Collection::Users,
    ];

    /// Name used in URLs and as the storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Compounds => "compounds",
            Collection::CompoundInstances => "compoundInstances",
            Collection::Transactions => "transactions",
            Collection::CountSessions => "countSessions",
            Collection::Users => "users",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schemaless JSON document storage; every document carries a string `id`
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(&self, collection: Collection, params: &ListParams) -> Result<Page<Value>>;
    async fn get_document(&self, collection: Collection, id: &str) -> Result<Option<Value>>;
    /// Insert a new document and return it as stored
    async fn insert_document(&self, collection: Collection, document: Value) -> Result<Value>;
    /// Replace an existing document; `None` when no document has this id
    async fn replace_document(&self, collection: Collection, id: &str, document: Value) -> Result<Option<Value>>;
    async fn delete_document(&self, collection: Collection, id: &str) -> Result<bool>;
}

pub fn document_id(document: &Value) -> Option<&str> {
    document.get("id").and_then(Value::as_str)
}

fn to_document<T: Serialize>(value: &T, collection: Collection) -> Result<Value> {
    serde_json::to_value(value).with_context(|| format!("Failed to serialize {} document", collection))
}

fn from_document<T: DeserializeOwned>(document: Value, collection: Collection) -> Result<T> {
    let id = document_id(&document).unwrap_or("<no id>").to_string();
    serde_json::from_value(document)
        .with_context(|| format!("Malformed {} document '{}'", collection, id))
}

async fn list_typed<S, T>(store: &S, collection: Collection, params: &ListParams) -> Result<Page<T>>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    let page = store.list_documents(collection, params).await?;
    let items = page
        .items
        .into_iter()
        .map(|doc| from_document(doc, collection))
        .collect::<Result<Vec<T>>>()?;
    Ok(Page { items, total: page.total })
}

async fn get_typed<S, T>(store: &S, collection: Collection, id: &str) -> Result<Option<T>>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    store
        .get_document(collection, id)
        .await?
        .map(|doc| from_document(doc, collection))
        .transpose()
}

async fn replace_typed<S, T>(store: &S, collection: Collection, id: &str, value: &T) -> Result<bool>
where
    S: DocumentStore + ?Sized,
    T: Serialize + Sync,
{
    let document = to_document(value, collection)?;
    Ok(store.replace_document(collection, id, document).await?.is_some())
}

#[async_trait::async_trait]
pub trait CompoundStore: Send + Sync {
    async fn list_compounds(&self, params: &ListParams) -> Result<Page<Compound>>;
    async fn get_compound(&self, id: &Id) -> Result<Option<Compound>>;
    async fn insert_compound(&self, compound: &Compound) -> Result<()>;
    /// Returns false when the compound does not exist
    async fn replace_compound(&self, compound: &Compound) -> Result<bool>;
    async fn delete_compound(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait InstanceStore: Send + Sync {
    async fn list_instances(&self, params: &ListParams) -> Result<Page<CompoundInstance>>;
    async fn get_instance(&self, id: &Id) -> Result<Option<CompoundInstance>>;
    async fn insert_instance(&self, instance: &CompoundInstance) -> Result<()>;
    async fn replace_instance(&self, instance: &CompoundInstance) -> Result<bool>;
    async fn delete_instance(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn list_transactions(&self, params: &ListParams) -> Result<Page<Transaction>>;
    async fn get_transaction(&self, id: &Id) -> Result<Option<Transaction>>;
    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()>;
    async fn replace_transaction(&self, transaction: &Transaction) -> Result<bool>;
    async fn delete_transaction(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait CountSessionStore: Send + Sync {
    async fn list_sessions(&self, params: &ListParams) -> Result<Page<InventoryCountSession>>;
    async fn get_session(&self, id: &Id) -> Result<Option<InventoryCountSession>>;
    async fn insert_session(&self, session: &InventoryCountSession) -> Result<()>;
    async fn replace_session(&self, session: &InventoryCountSession) -> Result<bool>;
    async fn delete_session(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn insert_user(&self, user: &User) -> Result<()>;
}

/// Typed access to one collection, implemented for every document store
macro_rules! typed_collection {
    ($trait_name:ident, $ty:ty, $collection:expr, $list:ident, $get:ident, $insert:ident, $replace:ident, $delete:ident) => {
        #[async_trait::async_trait]
        impl<S: DocumentStore + ?Sized> $trait_name for S {
            async fn $list(&self, params: &ListParams) -> Result<Page<$ty>> {
                list_typed(self, $collection, params).await
            }

            async fn $get(&self, id: &Id) -> Result<Option<$ty>> {
                get_typed(self, $collection, id).await
            }

            async fn $insert(&self, value: &$ty) -> Result<()> {
                let document = to_document(value, $collection)?;
                self.insert_document($collection, document).await?;
                Ok(())
            }

            async fn $replace(&self, value: &$ty) -> Result<bool> {
                replace_typed(self, $collection, &value.id, value).await
            }

            async fn $delete(&self, id: &Id) -> Result<bool> {
                self.delete_document($collection, id).await
            }
        }
    };
}

typed_collection!(
    CompoundStore,
    Compound,
    Collection::Compounds,
    list_compounds,
    get_compound,
    insert_compound,
    replace_compound,
    delete_compound
);
typed_collection!(
    InstanceStore,
    CompoundInstance,
    Collection::CompoundInstances,
    list_instances,
    get_instance,
    insert_instance,
    replace_instance,
    delete_instance
);
typed_collection!(
    TransactionStore,
    Transaction,
    Collection::Transactions,
    list_transactions,
    get_transaction,
    insert_transaction,
    replace_transaction,
    delete_transaction
);
typed_collection!(
    CountSessionStore,
    InventoryCountSession,
    Collection::CountSessions,
    list_sessions,
    get_session,
    insert_session,
    replace_session,
    delete_session
);

#[async_trait::async_trait]
impl<S: DocumentStore + ?Sized> UserStore for S {
    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(list_typed(self, Collection::Users, &ListParams::default()).await?.items)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let params = ListParams::filter("username", username);
        let page: Page<User> = list_typed(self, Collection::Users, &params).await?;
        Ok(page.items.into_iter().next())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let document = to_document(user, Collection::Users)?;
        self.insert_document(Collection::Users, document).await?;
        Ok(())
    }
}

pub trait Store:
    DocumentStore + CompoundStore + InstanceStore + TransactionStore + CountSessionStore + UserStore + Send + Sync
{
}

impl<T: DocumentStore> Store for T {}
