//! Typed operation requests.
//!
//! The positional `args` list of an envelope is parsed into one [`Request`]
//! variant per operation name at the routing boundary, so individual
//! handlers never see loosely-typed argument arrays. An unknown operation
//! name or arguments that do not validate for a known name both surface as
//! an error response, never as a silent drop.

use serde_json::Value;

use crate::backend::ChangesOptions;

use super::envelope::methods;
use super::errors::DbError;

/// One decoded operation request.
#[derive(Debug, Clone)]
pub enum Request {
    /// Open (or re-open) the client's database. `name` is extracted from
    /// the first argument, which may be a bare name or an options object
    /// carrying a `name` field.
    CreateDatabase { name: Option<String>, options: Value },
    /// Identity echo.
    Id,
    Info,
    Put { doc: Value, options: Value },
    Post { doc: Value, options: Value },
    Get { doc_id: String, options: Value },
    Remove { doc: Value, options: Value },
    AllDocs { options: Value },
    BulkDocs { docs: Vec<Value>, options: Value },
    RevsDiff { revs: Value },
    Compact { options: Value },
    ViewCleanup,
    Query { view: Value, options: Value },
    GetAttachment {
        doc_id: String,
        attachment_id: String,
        options: Value,
    },
    PutAttachment {
        doc_id: String,
        attachment_id: String,
        rev: Option<String>,
        body: Value,
        content_type: String,
    },
    RemoveAttachment {
        doc_id: String,
        attachment_id: String,
        rev: String,
    },
    /// Bulk (non-streaming) change feed read.
    Changes { options: ChangesOptions },
    /// Long-lived streaming change feed.
    LiveChanges { options: ChangesOptions },
    /// Out-of-band cancellation of the live subscription registered under
    /// this envelope's request id.
    CancelChanges,
    Destroy { options: Value },
}

impl Request {
    /// Parse one operation's argument list.
    ///
    /// `close` never reaches this function; the router handles it before
    /// dispatch.
    pub fn parse(operation: &str, args: Vec<Value>) -> Result<Self, DbError> {
        let mut args = Args::new(operation, args);

        let request = match operation {
            methods::CREATE_DATABASE => {
                let options = args.value_or_default();
                Self::CreateDatabase {
                    name: database_name(&options),
                    options,
                }
            }
            methods::ID => Self::Id,
            methods::INFO => Self::Info,
            methods::PUT => Self::Put {
                doc: args.required_value("doc")?,
                options: args.value_or_default(),
            },
            methods::POST => Self::Post {
                doc: args.required_value("doc")?,
                options: args.value_or_default(),
            },
            methods::GET => Self::Get {
                doc_id: args.required_string("doc id")?,
                options: args.value_or_default(),
            },
            methods::REMOVE => Self::Remove {
                doc: args.required_value("doc")?,
                options: args.value_or_default(),
            },
            methods::ALL_DOCS => Self::AllDocs {
                options: args.value_or_default(),
            },
            methods::BULK_DOCS => {
                let docs = match args.required_value("docs")? {
                    Value::Array(docs) => docs,
                    Value::Object(mut fields) => match fields.remove("docs") {
                        Some(Value::Array(docs)) => docs,
                        _ => {
                            return Err(DbError::bad_request("bulkDocs: docs must be an array"))
                        }
                    },
                    _ => return Err(DbError::bad_request("bulkDocs: docs must be an array")),
                };
                Self::BulkDocs {
                    docs,
                    options: args.value_or_default(),
                }
            }
            methods::REVS_DIFF => Self::RevsDiff {
                revs: args.required_value("revs map")?,
            },
            methods::COMPACT => Self::Compact {
                options: args.value_or_default(),
            },
            methods::VIEW_CLEANUP => Self::ViewCleanup,
            methods::QUERY => Self::Query {
                view: args.required_value("view")?,
                options: args.value_or_default(),
            },
            methods::GET_ATTACHMENT => Self::GetAttachment {
                doc_id: args.required_string("doc id")?,
                attachment_id: args.required_string("attachment id")?,
                options: args.value_or_default(),
            },
            methods::PUT_ATTACHMENT => Self::PutAttachment {
                doc_id: args.required_string("doc id")?,
                attachment_id: args.required_string("attachment id")?,
                rev: args.optional_string("rev")?,
                body: args.required_value("attachment body")?,
                content_type: args.required_string("content type")?,
            },
            methods::REMOVE_ATTACHMENT => Self::RemoveAttachment {
                doc_id: args.required_string("doc id")?,
                attachment_id: args.required_string("attachment id")?,
                rev: args.required_string("rev")?,
            },
            methods::CHANGES => Self::Changes {
                options: ChangesOptions::from_value(args.value_or_default())?,
            },
            methods::LIVE_CHANGES => Self::LiveChanges {
                options: ChangesOptions::from_value(args.value_or_default())?,
            },
            methods::CANCEL_CHANGES => Self::CancelChanges,
            methods::DESTROY => Self::Destroy {
                options: args.value_or_default(),
            },
            unknown => return Err(DbError::unknown_method(unknown)),
        };

        Ok(request)
    }
}

/// Positional argument cursor with method-aware error messages.
struct Args<'a> {
    method: &'a str,
    values: std::vec::IntoIter<Value>,
}

impl<'a> Args<'a> {
    fn new(method: &'a str, values: Vec<Value>) -> Self {
        Self {
            method,
            values: values.into_iter(),
        }
    }

    fn required_value(&mut self, what: &str) -> Result<Value, DbError> {
        self.values.next().ok_or_else(|| {
            DbError::bad_request(format!("{}: missing {what} argument", self.method))
        })
    }

    fn required_string(&mut self, what: &str) -> Result<String, DbError> {
        match self.values.next() {
            Some(Value::String(value)) => Ok(value),
            _ => Err(DbError::bad_request(format!(
                "{}: {what} must be a string",
                self.method
            ))),
        }
    }

    fn optional_string(&mut self, what: &str) -> Result<Option<String>, DbError> {
        match self.values.next() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(DbError::bad_request(format!(
                "{}: {what} must be a string",
                self.method
            ))),
        }
    }

    /// Next argument, or an empty options object when absent or null.
    fn value_or_default(&mut self) -> Value {
        match self.values.next() {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(value) => value,
        }
    }
}

fn database_name(options: &Value) -> Option<String> {
    let name = match options {
        Value::String(name) => Some(name.clone()),
        Value::Object(fields) => fields
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    name.filter(|name| !name.is_empty())
}
