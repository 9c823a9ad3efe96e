//! In-memory [`ObjectStore`] and [`CdnClient`] used by unit tests.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use s3_deploy_models::{CannedAcl, HostingConfig, InvalidationRequest, InvalidationResult};

use crate::cdn::{CdnClient, CdnError};
use crate::store::{ObjectStore, PutObject, StoreError};

/// What the fake bucket check answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadBehavior {
    Exists,
    Missing,
    Forbidden,
    Broken,
}

/// A recorded `put_object` call (body length instead of body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPut {
    pub key: String,
    pub size: usize,
    pub content_type: &'static str,
    pub acl: CannedAcl,
    pub cache_control: Option<&'static str>,
}

pub struct FakeStore {
    head: HeadBehavior,
    create_fails: bool,
    website_fails: bool,
    failing_keys: BTreeSet<String>,
    calls: Mutex<Vec<String>>,
    puts: Mutex<Vec<RecordedPut>>,
    websites: Mutex<Vec<HostingConfig>>,
}

impl FakeStore {
    pub fn new(head: HeadBehavior) -> Self {
        Self {
            head,
            create_fails: false,
            website_fails: false,
            failing_keys: BTreeSet::new(),
            calls: Mutex::new(Vec::new()),
            puts: Mutex::new(Vec::new()),
            websites: Mutex::new(Vec::new()),
        }
    }

    pub fn existing() -> Self {
        Self::new(HeadBehavior::Exists)
    }

    #[must_use]
    pub const fn with_create_failure(mut self) -> Self {
        self.create_fails = true;
        self
    }

    #[must_use]
    pub const fn with_website_failure(mut self) -> Self {
        self.website_fails = true;
        self
    }

    #[must_use]
    pub fn with_failing_key(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    /// Names of every store operation, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Every attempted put, in completion order.
    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap().clone()
    }

    pub fn put_for(&self, key: &str) -> Option<RecordedPut> {
        self.puts().into_iter().find(|p| p.key == key)
    }

    pub fn websites(&self) -> Vec<HostingConfig> {
        self.websites.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.record("head_bucket");
        match self.head {
            HeadBehavior::Exists => Ok(()),
            HeadBehavior::Missing => Err(StoreError::NotFound {
                message: format!("{bucket}: NotFound"),
            }),
            HeadBehavior::Forbidden => Err(StoreError::AccessDenied {
                message: format!("{bucket}: Forbidden"),
            }),
            HeadBehavior::Broken => Err(StoreError::Other {
                message: "dispatch failure: connection reset".to_string(),
            }),
        }
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        _region: &str,
        _acl: CannedAcl,
    ) -> Result<(), StoreError> {
        self.record("create_bucket");
        if self.create_fails {
            return Err(StoreError::Other {
                message: format!("{bucket}: BucketAlreadyExists"),
            });
        }
        Ok(())
    }

    async fn put_bucket_website(
        &self,
        _bucket: &str,
        hosting: &HostingConfig,
    ) -> Result<(), StoreError> {
        self.record("put_bucket_website");
        if self.website_fails {
            return Err(StoreError::AccessDenied {
                message: "PutBucketWebsite denied".to_string(),
            });
        }
        self.websites.lock().unwrap().push(hosting.clone());
        Ok(())
    }

    async fn put_object(&self, object: PutObject) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.puts.lock().unwrap().push(RecordedPut {
            key: object.key.clone(),
            size: object.body.len(),
            content_type: object.content_type,
            acl: object.acl,
            cache_control: object.cache_control,
        });
        if self.failing_keys.contains(&object.key) {
            return Err(StoreError::Other {
                message: "simulated transport error".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCdn {
    fails: bool,
    requests: Mutex<Vec<InvalidationRequest>>,
}

impl FakeCdn {
    pub fn failing() -> Self {
        Self {
            fails: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<InvalidationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CdnClient for FakeCdn {
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> Result<InvalidationResult, CdnError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fails {
            return Err(CdnError {
                distribution_id: request.distribution_id.clone(),
                code: Some("AccessDenied".to_string()),
                message: "User is not authorized to perform cloudfront:CreateInvalidation"
                    .to_string(),
                request_id: Some("req-123".to_string()),
            });
        }
        Ok(InvalidationResult {
            id: "I2J0I21PCUYOIK".to_string(),
            status: "InProgress".to_string(),
            caller_reference: request.caller_reference.clone(),
        })
    }
}
