//! Uploads a GIF89a-prefixed webshell under a `.jsp`/`.jspx`/`.php` name with
//! an `image/jpeg` content-type, into requests that already carry an upload
//! reaching a `fileUpload` (or, on Java targets, `writeFile`) sink.

use crate::builtins::common::single_stack_hash;
use crate::plugin::{Batch, CheckOutcome, CheckedBatch, PlannedRequest, Plugin};
use iast_builder::{is_php_upload, is_webroot_write, FileField, FileValue, Mutation, RequestDraft};
use iast_model::{Record, Sink, VulnHook};

const EXTENSIONS: &[&str] = &[".jsp", ".jspx", ".php"];
const GIF89A_MAGIC: &[u8] = b"GIF89a";
const PAYLOAD_MARKER: &[u8] = b"<%openrasp%>";

pub struct FileUploadBasic;

impl Plugin for FileUploadBasic {
    fn name(&self) -> &'static str {
        "fileupload_basic"
    }

    fn description(&self) -> &'static str {
        "uploads a disguised webshell into requests carrying an upload sink"
    }

    fn mutate(&self, record: &Record) -> Vec<Batch> {
        let reaches_upload_sink = record
            .sinks
            .iter()
            .any(|s| matches!(s, Sink::FileUpload { .. } | Sink::WriteFile { .. }));
        if !reaches_upload_sink || record.files.is_empty() {
            return Vec::new();
        }

        let mut content = GIF89A_MAGIC.to_vec();
        content.extend_from_slice(PAYLOAD_MARKER);

        let mut batches = Vec::new();
        for ext in EXTENSIONS {
            let filename = format!("openrasp_shell{ext}");
            let Ok(mut draft) = RequestDraft::from_record(record) else { continue };
            if draft
                .apply(Mutation::File { index: 0, field: FileField::Filename, value: FileValue::Text(filename.clone()) })
                .is_err()
            {
                continue;
            }
            let _ = draft.apply(Mutation::File {
                index: 0,
                field: FileField::ContentType,
                value: FileValue::Text("image/jpeg".into()),
            });
            let _ = draft.apply(Mutation::File {
                index: 0,
                field: FileField::Content,
                value: FileValue::Bytes(content.clone()),
            });
            batches.push(vec![PlannedRequest { draft, feature: filename }]);
        }
        batches
    }

    fn check(&self, batch: &CheckedBatch<'_>) -> Option<CheckOutcome> {
        let request = batch.requests.first()?;
        let record = request.record.as_ref()?;
        let app_base_path = &batch.original.app_base_path;

        for (index, sink) in record.sinks.iter().enumerate() {
            let reached = is_php_upload(sink, &request.feature, app_base_path)
                || is_webroot_write(sink, &request.feature, app_base_path);
            if reached {
                return Some(CheckOutcome {
                    message: format!("webshell upload: {:?} landed under the application webroot", request.feature),
                    records: vec![record.clone()],
                    vuln_hook: Some(VulnHook { sink_index: index, stack_hash: single_stack_hash(sink) }),
                    upload: true,
                });
            }
        }
        None
    }
}
