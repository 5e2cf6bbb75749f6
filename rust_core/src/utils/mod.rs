pub mod text;

#[cfg(test)]
pub(crate) mod mock_http;
