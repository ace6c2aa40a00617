use httpmock::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use zohocrm_config::{AppConfig, BrokerConfig};
use zohocrm_connectors::CrmClient;
use zohocrm_mcp::jsonrpc::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};
use zohocrm_mcp::{serve, GovernanceConfig, McpServer};

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.broker = BrokerConfig {
        base_url: server.base_url(),
        secret_key: "sk-test".to_string(),
        connection_id: "conn-1".to_string(),
        integration_id: "zoho-crm".to_string(),
    };
    config.crm.api_base_template = format!("{}/crm/v2", server.base_url());
    config.crm.timeout_secs = 5;
    config.crm.connect_timeout_secs = 2;
    config.crm.retry.initial_delay_ms = 1;
    config.crm.retry.max_delay_ms = 5;
    config.crm.retry.jitter = false;
    config
}

fn mock_broker(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path("/connection/conn-1");
        then.status(200).json_body(json!({
            "connection_config": {"extension": "com"},
            "credentials": {"access_token": "1000.live"}
        }));
    })
}

fn mcp_server(config: &AppConfig) -> McpServer {
    let client = CrmClient::from_config(config).unwrap();
    McpServer::new(client, GovernanceConfig::from_config(config))
}

async fn request(server: &McpServer, message: Value) -> Value {
    let response = server
        .handle_line(&message.to_string())
        .await
        .expect("a request gets a response");
    serde_json::to_value(response).unwrap()
}

fn call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

#[tokio::test]
async fn initialize_negotiates_protocol_version() {
    let crm = MockServer::start();
    let server = mcp_server(&config_for(&crm));

    let response = request(
        &server,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "0.0.1"}
        }}),
    )
    .await;
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["protocolVersion"], json!("2024-11-05"));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("zoho-crm"));
    assert!(response["result"]["capabilities"]["tools"].is_object());

    let response = request(
        &server,
        json!({"jsonrpc": "2.0", "id": 2, "method": "initialize", "params": {"protocolVersion": "1999-01-01"}}),
    )
    .await;
    assert_eq!(response["result"]["protocolVersion"], json!("2025-06-18"));
}

#[tokio::test]
async fn protocol_errors() {
    let crm = MockServer::start();
    let server = mcp_server(&config_for(&crm));

    let response = request(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"})).await;
    assert_eq!(response["error"]["code"], json!(METHOD_NOT_FOUND));

    let response = request(&server, json!({"jsonrpc": "1.0", "id": 2, "method": "ping"})).await;
    assert_eq!(response["error"]["code"], json!(INVALID_REQUEST));
    assert_eq!(response["id"], json!(2));

    let response = serde_json::to_value(server.handle_line("{not json").await.unwrap()).unwrap();
    assert_eq!(response["error"]["code"], json!(PARSE_ERROR));
    assert_eq!(response["id"], Value::Null);

    let batch = json!([{"jsonrpc": "2.0", "id": 3, "method": "ping"}]).to_string();
    let response = serde_json::to_value(server.handle_line(&batch).await.unwrap()).unwrap();
    assert_eq!(response["error"]["code"], json!(INVALID_REQUEST));

    let response = request(&server, json!({"jsonrpc": "2.0", "id": 4, "method": "ping"})).await;
    assert_eq!(response["result"], json!({}));
}

#[tokio::test]
async fn notifications_are_silent() {
    let crm = MockServer::start();
    let server = mcp_server(&config_for(&crm));
    let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    assert!(server.handle_line(&notification.to_string()).await.is_none());
    assert!(server.handle_line("   ").await.is_none());
}

#[tokio::test]
async fn tools_list_honours_governance() {
    let crm = MockServer::start();
    let mut config = config_for(&crm);
    let server = mcp_server(&config);
    let response = request(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 15);

    config.server.deny = vec!["delete_*".to_string(), "get_crm_org".to_string()];
    let server = mcp_server(&config);
    let response = request(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 13);
    assert!(!names.contains(&"delete_crm_record"));
    assert!(!names.contains(&"get_crm_org"));

    let response = request(
        &server,
        call(3, "delete_crm_record", json!({"module": "Leads", "record_id": "1"})),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(INVALID_REQUEST));
}

#[tokio::test]
async fn get_record_tool_returns_structured_content() {
    let crm = MockServer::start();
    let broker = mock_broker(&crm);
    let get = crm.mock(|when, then| {
        when.method(GET)
            .path("/crm/v2/Leads/4150868000001")
            .header("authorization", "Zoho-oauthtoken 1000.live");
        then.status(200).json_body(json!({
            "data": [{"id": "4150868000001", "Last_Name": "Doe", "Email": "jane@example.com"}]
        }));
    });
    let server = mcp_server(&config_for(&crm));

    let response = request(
        &server,
        call(7, "get_crm_record", json!({"module": "Leads", "record_id": "4150868000001"})),
    )
    .await;
    let result = &response["result"];
    assert_eq!(result["isError"], json!(false));
    assert_eq!(result["structuredContent"]["Last_Name"], json!("Doe"));
    let text = result["content"][0]["text"].as_str().unwrap();
    assert_eq!(serde_json::from_str::<Value>(text).unwrap(), result["structuredContent"]);
    broker.assert_hits(1);
    get.assert_hits(1);
}

#[tokio::test]
async fn domain_errors_are_tool_results_without_secrets() {
    let crm = MockServer::start();
    mock_broker(&crm);
    crm.mock(|when, then| {
        when.method(GET).path("/crm/v2/Leads/999");
        then.status(204);
    });
    let server = mcp_server(&config_for(&crm));

    let response = request(
        &server,
        call(1, "get_crm_record", json!({"module": "Leads", "record_id": "999"})),
    )
    .await;
    assert!(response.get("error").is_none());
    let result = &response["result"];
    assert_eq!(result["isError"], json!(true));
    assert_eq!(result["structuredContent"]["error"]["kind"], json!("RecordNotFound"));

    let raw = response.to_string();
    assert!(!raw.contains("1000.live"));
    assert!(!raw.contains("sk-test"));

    let response = request(
        &server,
        call(2, "get_crm_records", json!({"module": "Leads", "per_page": 500})),
    )
    .await;
    assert_eq!(
        response["result"]["structuredContent"]["error"]["kind"],
        json!("InvalidPagination")
    );
}

#[tokio::test]
async fn argument_errors_are_invalid_params() {
    let crm = MockServer::start();
    let server = mcp_server(&config_for(&crm));

    let response = request(&server, call(1, "create_crm_lead", json!({"last_name": "Doe"}))).await;
    assert_eq!(response["error"]["code"], json!(INVALID_PARAMS));

    let response = request(&server, call(2, "no_such_tool", json!({}))).await;
    assert_eq!(response["error"]["code"], json!(METHOD_NOT_FOUND));
}

#[tokio::test]
async fn structured_search_sends_criteria() {
    let crm = MockServer::start();
    mock_broker(&crm);
    let search = crm.mock(|when, then| {
        when.method(GET)
            .path("/crm/v2/Contacts/search")
            .query_param("criteria", "((Last_Name:equals:Lee)and(Account_Name:starts_with:Zyl))")
            .query_param("page", "2")
            .query_param("per_page", "10");
        then.status(200).json_body(json!({
            "data": [{"id": "1", "Last_Name": "Lee", "Account_Name": "Zylker"}],
            "info": {"page": 2, "per_page": 10, "count": 1, "more_records": false}
        }));
    });
    let server = mcp_server(&config_for(&crm));

    let response = request(
        &server,
        call(1, "search_crm_records", json!({
            "module": "Contacts",
            "conditions": [
                {"field": "Last_Name", "comparator": "equals", "value": "Lee"},
                {"field": "Account_Name", "comparator": "starts_with", "value": "Zyl"}
            ],
            "page": 2,
            "per_page": 10
        })),
    )
    .await;
    let content = &response["result"]["structuredContent"];
    assert_eq!(content["records"][0]["Account_Name"], json!("Zylker"));
    assert_eq!(content["info"]["more_records"], json!(false));
    search.assert_hits(1);
}

#[tokio::test]
async fn create_lead_tool_maps_fields() {
    let crm = MockServer::start();
    mock_broker(&crm);
    let create = crm.mock(|when, then| {
        when.method(POST).path("/crm/v2/Leads").json_body(json!({
            "data": [{"First_Name": "Jane", "Last_Name": "Doe", "Company": "Zylker"}]
        }));
        then.status(201).json_body(json!({
            "data": [{
                "code": "SUCCESS",
                "details": {"id": "4150868000002"},
                "message": "record added",
                "status": "success"
            }]
        }));
    });
    let server = mcp_server(&config_for(&crm));

    let response = request(
        &server,
        call(1, "create_crm_lead", json!({"first_name": "Jane", "last_name": "Doe", "company": "Zylker"})),
    )
    .await;
    assert_eq!(response["result"]["isError"], json!(false));
    assert_eq!(response["result"]["structuredContent"]["id"], json!("4150868000002"));
    create.assert_hits(1);
}

#[tokio::test]
async fn serve_answers_each_request_line() {
    let crm = MockServer::start();
    let server = Arc::new(mcp_server(&config_for(&crm)));

    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        String::new(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string(),
    ]
    .join("\n");

    let (writer, mut reader) = tokio::io::duplex(1 << 20);
    serve(server, input.as_bytes(), writer).await.unwrap();

    let mut output = String::new();
    reader.read_to_string(&mut output).await.unwrap();
    let mut ids: Vec<i64> = output
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["id"].as_i64().unwrap())
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
}
