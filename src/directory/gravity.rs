use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use super::{ContactAddress, DirectoryError, PartnerDirectory};

const APP_TOKEN_HEADER: &str = "X-XAPP-TOKEN";

/// Partner directory backed by the Gravity HTTP API.
pub struct GravityDirectory {
    client: Client,
    api_url: Url,
    app_token: String,
    communication_id: String,
}

#[derive(Debug, Deserialize)]
struct GravityPartner {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GravityPartnerContact {
    email: Option<String>,
}

impl GravityDirectory {
    /// `communication_id` selects which partner contacts have opted into consignment emails.
    pub fn new(
        api_url: &str,
        app_token: String,
        communication_id: String,
    ) -> Result<GravityDirectory, DirectoryError> {
        let api_url = Url::parse(api_url)?;
        if api_url.cannot_be_a_base() {
            return Err(DirectoryError::NotABaseUrl(api_url.to_string()));
        }

        Ok(GravityDirectory {
            client: Client::new(),
            api_url,
            app_token,
            communication_id,
        })
    }

    /// Appends `segments` to the API URL, escaping each one.
    fn url_for(&self, segments: &[&str]) -> Result<Url, DirectoryError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::NotABaseUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        external_id: &str,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let url = self.url_for(segments)?;
        debug!("Requesting {url}");

        let response = self
            .client
            .get(url.clone())
            .header(APP_TOKEN_HEADER, &self.app_token)
            .query(query)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(DirectoryError::PartnerNotFound(external_id.to_string())),
            status => Err(DirectoryError::Status {
                status,
                url: url.to_string(),
            }),
        }
    }
}

#[async_trait]
impl PartnerDirectory for GravityDirectory {
    async fn partner_display_name(&self, external_id: &str) -> Result<String, DirectoryError> {
        let partner: GravityPartner = self
            .get(external_id, &["partners", external_id], &[])
            .await?;

        Ok(partner.name)
    }

    async fn partner_contacts(
        &self,
        external_id: &str,
    ) -> Result<Vec<ContactAddress>, DirectoryError> {
        let contacts: Vec<GravityPartnerContact> = self
            .get(
                external_id,
                &["partners", external_id, "partner_contacts"],
                &[("communication_id", self.communication_id.as_str())],
            )
            .await?;

        Ok(contacts
            .into_iter()
            .filter_map(|contact| contact.email)
            .filter(|email| !email.trim().is_empty())
            .map(ContactAddress)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::GravityDirectory;
    use crate::directory::{ContactAddress, DirectoryError, PartnerDirectory};

    fn directory(server: &MockServer) -> GravityDirectory {
        GravityDirectory::new(
            &format!("{}/api/v1/", server.uri()),
            "app-token".to_string(),
            "comm1".to_string(),
        )
        .unwrap()
    }

    #[test(tokio::test)]
    async fn fetches_display_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/partners/partnerid"))
            .and(header("X-XAPP-TOKEN", "app-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"_id":"partnerid","name":"Juliens Auctions"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let name = directory(&server)
            .partner_display_name("partnerid")
            .await
            .unwrap();
        assert_eq!(name, "Juliens Auctions");
    }

    #[test(tokio::test)]
    async fn fetches_contacts_for_the_consignment_communication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/partners/partnerid/partner_contacts"))
            .and(query_param("communication_id", "comm1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"[{"email":"contact1@partner.com"},{"email":null},{"email":"contact2@partner.com"}]"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let contacts = directory(&server)
            .partner_contacts("partnerid")
            .await
            .unwrap();
        assert_eq!(
            contacts,
            vec![
                ContactAddress("contact1@partner.com".to_string()),
                ContactAddress("contact2@partner.com".to_string()),
            ]
        );
    }

    #[test(tokio::test)]
    async fn empty_contact_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/partners/phillips/partner_contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("[]", "application/json"))
            .mount(&server)
            .await;

        let contacts = directory(&server).partner_contacts("phillips").await.unwrap();
        assert!(contacts.is_empty());
    }

    #[test(tokio::test)]
    async fn unknown_partner() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/partners/nobody"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(matches!(
            directory(&server).partner_display_name("nobody").await,
            Err(DirectoryError::PartnerNotFound(id)) if id == "nobody"
        ));
    }

    #[test(tokio::test)]
    async fn server_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        assert!(matches!(
            directory(&server).partner_contacts("partnerid").await,
            Err(DirectoryError::Status { status, .. }) if status.as_u16() == 502
        ));
    }

    #[test(tokio::test)]
    async fn external_ids_are_escaped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/partners/a%2Fb%3Fc%23d/partner_contacts"))
            .and(query_param("communication_id", "comm1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"[{"email":"contact1@partner.com"}]"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let contacts = directory(&server).partner_contacts("a/b?c#d").await.unwrap();
        assert_eq!(contacts, vec![ContactAddress("contact1@partner.com".to_string())]);
    }

    #[test]
    fn works_with_and_without_trailing_slash() {
        for api_url in ["https://api.artsy.net/api/v1", "https://api.artsy.net/api/v1/"] {
            let directory =
                GravityDirectory::new(api_url, "app-token".to_string(), "comm1".to_string())
                    .unwrap();
            assert_eq!(
                directory.url_for(&["partners", "partnerid"]).unwrap().as_str(),
                "https://api.artsy.net/api/v1/partners/partnerid"
            );
        }
    }

    #[test]
    fn rejects_unusable_api_urls() {
        assert!(matches!(
            GravityDirectory::new("not a url", "app-token".to_string(), "comm1".to_string()),
            Err(DirectoryError::InvalidUrl(_))
        ));
        assert!(matches!(
            GravityDirectory::new("mailto:api@artsy.net", "app-token".to_string(), "comm1".to_string()),
            Err(DirectoryError::NotABaseUrl(_))
        ));
    }
}
