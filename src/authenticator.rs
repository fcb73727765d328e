use tracing::warn;

use crate::credential::CredentialStore;
use crate::request::RequestDescriptor;

/// Stamps `Authorization: Bearer <access token>` on an outbound request.
///
/// Requests go out untouched when there is no stored credential, since some endpoints (login,
/// refresh) are reachable anonymously. A store that cannot be read counts as "no credential".
pub fn authenticate_request<S>(store: &S, request: &mut RequestDescriptor)
where
    S: CredentialStore + ?Sized,
{
    let credential = match store.get() {
        Ok(Some(credential)) => credential,
        Ok(None) => return,
        Err(err) => {
            warn!(request_id = %request.id(), "reading stored credentials: {err}");
            return;
        }
    };

    if let Err(err) = request.set_bearer(credential.access_token()) {
        warn!(request_id = %request.id(), "stored access token is not a valid header value: {err}");
    }
}

#[cfg(test)]
mod tests {
    use http::header::AUTHORIZATION;

    use super::*;
    use crate::credential::{Credential, MemoryCredentialStore, StoreError, StoredSession};

    struct BrokenStore;

    impl CredentialStore for BrokenStore {
        fn load(&self) -> Result<StoredSession, StoreError> {
            Err(StoreError::Io("disk unplugged".into()))
        }

        fn update(&self, _: &mut dyn FnMut(&mut StoredSession)) -> Result<(), StoreError> {
            Err(StoreError::Io("disk unplugged".into()))
        }

        fn clear(&self) -> Result<(), StoreError> {
            Err(StoreError::Io("disk unplugged".into()))
        }
    }

    #[test]
    fn stamps_stored_access_token() {
        let store = MemoryCredentialStore::with_credential(Credential::new("tok1".into(), None));
        let mut request = RequestDescriptor::get("vehicles/");

        authenticate_request(&store, &mut request);

        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer tok1");
    }

    #[test]
    fn overrides_a_stale_authorization_header() {
        let store = MemoryCredentialStore::with_credential(Credential::new("tok2".into(), None));
        let mut request = RequestDescriptor::get("vehicles/");
        request.set_bearer("tok1").unwrap();

        authenticate_request(&store, &mut request);

        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer tok2");
    }

    #[test]
    fn leaves_request_untouched_without_credential() {
        let mut request = RequestDescriptor::post("token/");

        authenticate_request(&MemoryCredentialStore::default(), &mut request);
        authenticate_request(&BrokenStore, &mut request);

        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn keeps_explicit_header_without_credential() {
        let mut request = RequestDescriptor::get("trips/");
        request.set_bearer("tok2").unwrap();

        authenticate_request(&MemoryCredentialStore::default(), &mut request);

        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer tok2");
    }
}
