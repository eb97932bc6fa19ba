use crate::http::request::Request;
use crate::http::response::Response;

/// Application callback turning one parsed request into one response.
///
/// The request is passed mutably so the handler can queue cookies through
/// [`Request::cookies`]; they are flushed onto the response before it is
/// sent. Returning an error yields a 500 and closes the connection.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, request: &mut Request) -> anyhow::Result<Response>;
}

impl<F> Handler for F
where
    F: Fn(&mut Request) -> anyhow::Result<Response> + Send + Sync + 'static,
{
    fn serve(&self, request: &mut Request) -> anyhow::Result<Response> {
        self(request)
    }
}

/// Answers every request with 404.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFoundHandler;

impl Handler for NotFoundHandler {
    fn serve(&self, _request: &mut Request) -> anyhow::Result<Response> {
        Ok(Response::not_found())
    }
}
