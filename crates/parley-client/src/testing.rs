//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use parley_store::{
    CollectionPath, DocumentPath, DocumentSnapshot, DocumentStore, Fields, Query, QuerySnapshot,
    SetOptions, StoreError, Subscription, WriteBatch,
};

/// Delegates to an inner store, failing writes or subscriptions on demand.
pub(crate) struct FlakyStore<S> {
    inner: S,
    pub(crate) fail_writes: AtomicBool,
    pub(crate) fail_watches: AtomicBool,
}

impl<S> FlakyStore<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_watches: AtomicBool::new(false),
        }
    }

    fn check(&self, flag: &AtomicBool) -> parley_store::Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("offline".into()))
        } else {
            Ok(())
        }
    }
}

impl<S: DocumentStore> DocumentStore for FlakyStore<S> {
    async fn set(
        &self,
        path: &DocumentPath,
        fields: Fields,
        options: SetOptions,
    ) -> parley_store::Result<()> {
        self.check(&self.fail_writes)?;
        self.inner.set(path, fields, options).await
    }

    async fn add(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> parley_store::Result<DocumentPath> {
        self.check(&self.fail_writes)?;
        self.inner.add(collection, fields).await
    }

    async fn update(
        &self,
        path: &DocumentPath,
        fields: Fields,
    ) -> parley_store::Result<()> {
        self.check(&self.fail_writes)?;
        self.inner.update(path, fields).await
    }

    async fn delete(&self, path: &DocumentPath) -> parley_store::Result<()> {
        self.check(&self.fail_writes)?;
        self.inner.delete(path).await
    }

    async fn commit(&self, batch: WriteBatch) -> parley_store::Result<()> {
        self.check(&self.fail_writes)?;
        self.inner.commit(batch).await
    }

    async fn get(&self, path: &DocumentPath) -> parley_store::Result<DocumentSnapshot> {
        self.inner.get(path).await
    }

    async fn query(&self, query: &Query) -> parley_store::Result<QuerySnapshot> {
        self.inner.query(query).await
    }

    async fn watch_document(
        &self,
        path: &DocumentPath,
    ) -> parley_store::Result<Subscription<DocumentSnapshot>> {
        self.check(&self.fail_watches)?;
        self.inner.watch_document(path).await
    }

    async fn watch_query(
        &self,
        query: &Query,
    ) -> parley_store::Result<Subscription<QuerySnapshot>> {
        self.check(&self.fail_watches)?;
        self.inner.watch_query(query).await
    }
}
