//! HTTP uploader using the LMS three-step file upload flow.
//!
//! Per file: (1) a preflight `POST` announces name and size and returns an
//! upload slot, (2) a `multipart/form-data` `POST` sends the slot's
//! parameters as form fields followed by the bytes as the final `file`
//! part, (3) the response carries the new file id.

use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::models::upload::{BatchRequest, BatchState, FileUploadContext, UploadFile};
use crate::remote::http::{HttpApi, STRING_IDS_ACCEPT};
use crate::remote::types::{ApiFile, ApiUploadTarget};
use crate::{AppError, Result};

use super::{BatchPublisher, FileUploader, UploadBatch};

/// Uploads batches over HTTP on background tasks.
#[derive(Clone)]
pub struct HttpUploader {
    api: HttpApi,
}

impl HttpUploader {
    /// Create an uploader sharing `api`'s client and credentials.
    #[must_use]
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }
}

impl FileUploader for HttpUploader {
    fn upload(&self, request: BatchRequest, cancel: CancellationToken) -> UploadBatch {
        let (publisher, batch) = UploadBatch::channel(&request.batch_id, cancel.clone());
        let span = info_span!("upload_batch", batch_id = %request.batch_id);
        let api = self.api.clone();
        tokio::spawn(run_batch(api, request, publisher, cancel).instrument(span));
        batch
    }
}

async fn run_batch(
    api: HttpApi,
    request: BatchRequest,
    publisher: BatchPublisher,
    cancel: CancellationToken,
) {
    publisher.publish(BatchState::Staged);

    let total = request.files.len();
    let mut file_ids = Vec::with_capacity(total);

    for (index, file) in request.files.iter().enumerate() {
        publisher.publish(BatchState::Uploading {
            completed: index,
            total,
        });

        let result = tokio::select! {
            () = cancel.cancelled() => {
                info!("upload batch cancelled");
                return;
            }
            result = upload_one(&api, &request.context, file) => result,
        };

        match result {
            Ok(id) => file_ids.push(id),
            Err(err) => {
                warn!(file = %file.name, %err, "file upload failed");
                publisher.publish(BatchState::Failed {
                    error: AppError::Upload(format!("{}: {err}", file.name)),
                });
                return;
            }
        }
    }

    info!(files = total, "upload batch completed");
    publisher.publish(BatchState::Completed { file_ids });
}

fn preflight_path(context: &FileUploadContext) -> String {
    match context {
        FileUploadContext::SubmissionComment {
            course_id,
            assignment_id,
        } => format!(
            "/api/v1/courses/{course_id}/assignments/{assignment_id}/submissions/self/comments/files"
        ),
    }
}

async fn upload_one(api: &HttpApi, context: &FileUploadContext, file: &UploadFile) -> Result<String> {
    let bytes = tokio::fs::read(&file.path).await?;

    let url = api.url(&preflight_path(context), &[])?;
    let response = api
        .client()
        .post(url)
        .bearer_auth(api.token())
        .header(ACCEPT, STRING_IDS_ACCEPT)
        .json(&serde_json::json!({ "name": file.name, "size": bytes.len() }))
        .send()
        .await
        .map_err(|err| AppError::Network(format!("upload preflight: {err}")))?;
    let target: ApiUploadTarget = HttpApi::decode("upload preflight", response).await?;

    let upload_url = Url::parse(&target.upload_url)
        .map_err(|err| AppError::Upload(format!("invalid upload url: {err}")))?;
    let form = upload_form(target, file, bytes);

    // The slot may live on a storage host; the API token is not sent there.
    let response = api
        .client()
        .post(upload_url)
        .header(ACCEPT, STRING_IDS_ACCEPT)
        .multipart(form)
        .send()
        .await
        .map_err(|err| AppError::Network(format!("upload file: {err}")))?;
    let created: ApiFile = HttpApi::decode("upload file", response).await?;
    Ok(created.id)
}

/// Slot parameters first; the storage host ignores anything after `file`.
fn upload_form(target: ApiUploadTarget, file: &UploadFile, bytes: Vec<u8>) -> Form {
    let form = target
        .upload_params
        .into_iter()
        .fold(Form::new(), |form, (key, value)| form.text(key, value));
    form.part("file", Part::bytes(bytes).file_name(file.name.clone()))
}
