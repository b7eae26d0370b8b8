use utoipa::openapi::{
    content::ContentBuilder,
    info::InfoBuilder,
    path::{HttpMethod, OperationBuilder as UOperationBuilder, PathItemBuilder, PathsBuilder},
    request_body::RequestBodyBuilder,
    response::{ResponseBuilder, ResponsesBuilder},
    schema::{ComponentsBuilder, ObjectBuilder, Schema},
    OpenApi, OpenApiBuilder, Ref, RefOr, Required,
};
use utoipa::{PartialSchema, ToSchema};

use super::problem::{Problem, APPLICATION_PROBLEM_JSON};
use crate::binder::BoundService;
use crate::schema::TypeDescriptor;

/// Build the OpenAPI document for a bound app: one `POST` operation per endpoint.
pub fn build_openapi(service: &BoundService) -> OpenApi {
    let routes = service.routes();
    tracing::debug!(
        app = %service.app_name(),
        operations = routes.len(),
        "Building OpenAPI"
    );

    let problem_name = Problem::name().to_string();
    let mut paths = PathsBuilder::new();

    for route in routes {
        let ep = &route.endpoint;

        let request_body = RequestBodyBuilder::new()
            .content(
                "application/json",
                ContentBuilder::new()
                    .schema(Some(schema_of(ep.input_type())))
                    .build(),
            )
            .required(Some(Required::True))
            .build();

        let ok = ResponseBuilder::new()
            .description("Success")
            .content(
                "application/json",
                ContentBuilder::new()
                    .schema(Some(schema_of(ep.output_type())))
                    .build(),
            )
            .build();

        let mut responses = ResponsesBuilder::new().response("200", ok);
        for (status, description) in [
            ("422", "Input does not match the request schema"),
            ("500", "Handler failed"),
            ("503", "App is not ready"),
        ] {
            let content = ContentBuilder::new()
                .schema(Some(RefOr::Ref(Ref::from_schema_name(problem_name.clone()))))
                .build();
            responses = responses.response(
                status,
                ResponseBuilder::new()
                    .description(description)
                    .content(APPLICATION_PROBLEM_JSON, content)
                    .build(),
            );
        }

        let op = UOperationBuilder::new()
            .operation_id(Some(ep.name.clone()))
            .summary(Some(format!("{}()", ep.name)))
            .tag(service.app_name())
            .request_body(Some(request_body))
            .responses(responses.build());

        let item = PathItemBuilder::new()
            .operation(HttpMethod::Post, op.build())
            .build();
        paths = paths.path(ep.path.clone(), item);
    }

    let components = ComponentsBuilder::new()
        .schema(problem_name, <Problem as PartialSchema>::schema())
        .build();

    let info = InfoBuilder::new()
        .title(service.app_name())
        .version(env!("CARGO_PKG_VERSION"))
        .build();

    OpenApiBuilder::new()
        .info(info)
        .paths(paths.build())
        .components(Some(components))
        .build()
}

fn schema_of(ty: Option<&TypeDescriptor>) -> RefOr<Schema> {
    ty.and_then(|t| t.schema().cloned())
        .unwrap_or_else(|| Schema::Object(ObjectBuilder::new().build()).into())
}
