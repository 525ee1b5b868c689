pub mod error;
pub mod requests;
pub mod responses;
pub mod status;
pub mod tenant;


pub use error::{HttpgrpcError, Result};
pub use requests::{ClientFrame, Header, HttpRequest, RequestId, RpcRequest, HANDLE_METHOD};
pub use responses::{HttpResponse, RpcResponse};
pub use status::{Code, Detail, Status, HTTP_RESPONSE_TYPE_URL, MAX_STATUS_MESSAGE_BYTES};
pub use tenant::{TenantId, TENANT_HEADER};
