use aws_sdk_s3::primitives::ByteStream;
use tracing::info;
use uuid::Uuid;

use crate::interview::transcript::render_markdown;
use crate::interview::InterviewOutcome;
use crate::mailbox::Session;

/// Uploads Markdown transcripts of closed sessions for the evaluation consumer.
#[derive(Clone)]
pub struct TranscriptArchive {
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl TranscriptArchive {
    pub fn new(s3: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { s3, bucket }
    }

    pub fn object_key(session_id: Uuid) -> String {
        format!("transcripts/{session_id}.md")
    }

    /// Returns the object key written.
    pub async fn upload(
        &self,
        session: &Session,
        outcome: &InterviewOutcome,
    ) -> anyhow::Result<String> {
        let markdown = render_markdown(session, &outcome.answers, outcome.planned_date);
        let key = Self::object_key(session.id);

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("text/markdown; charset=utf-8")
            .body(ByteStream::from(markdown.into_bytes()))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

        info!("Archived transcript to s3://{}/{}", self.bucket, key);
        Ok(key)
    }
}
