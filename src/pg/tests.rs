//! Session level tests over a scripted connection.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use super::connection::{Column, ResultSet};
use super::statement::{PreparationStatus, PreparedQuery};
use super::types::PgValue;
use crate::builder::SessionBuilder;
use crate::config::SessionConfig;
use crate::error::{FoundationError, Result};
use crate::pool::Client;
use crate::pooler::{Pooler, PoolerState};
use crate::session::Session;
use crate::testing::{stub_session, stub_session_with, Call};

/// A pooler for a kind the session does not know about.
#[derive(Debug, Default)]
struct PikaPooler {
    state: PoolerState,
}

#[derive(Debug)]
struct Pika {
    name: String,
}

impl Client for Pika {
    fn client_type(&self) -> &str {
        "pika"
    }

    fn client_identifier(&self) -> &str {
        &self.name
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Pooler for PikaPooler {
    fn pooler_type(&self) -> &str {
        "pika"
    }

    fn state(&self) -> &PoolerState {
        &self.state
    }

    fn create_client(&self, _session: &Session, identifier: &str) -> Result<Arc<dyn Client>> {
        Ok(Arc::new(Pika {
            name: identifier.to_string(),
        }))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn is_anonymous_containing(fragment: &'static str) -> impl Fn(&Call) -> bool {
    move |call| matches!(call, Call::Anonymous(sql) if sql.contains(fragment))
}

// ============================================================================
// Pooling
// ============================================================================

mod pooling {
    use super::*;

    #[test]
    fn test_converter_is_pooled_once() {
        let (session, _handle) = stub_session();
        let first = session.converter("int4").unwrap();
        let second = session.converter("int4").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(session.has_client("converter", "int4"));
    }

    #[test]
    fn test_removed_client_is_rebuilt() {
        let (session, _handle) = stub_session();
        let first = session.converter("int4").unwrap();
        session.remove_client("converter", "int4").unwrap();
        assert!(!session.has_client("converter", "int4"));

        let second = session.converter("int4").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_remove_unknown_client_fails() {
        let (session, _handle) = stub_session();
        let err = session.remove_client("converter", "int4").unwrap_err();
        assert!(matches!(err, FoundationError::PoolUsage(_)));
    }

    #[test]
    fn test_array_types_share_one_converter() {
        let (session, _handle) = stub_session();
        let ints = session.converter("int4[]").unwrap();
        let texts = session.converter("_text").unwrap();
        assert!(Arc::ptr_eq(&ints, &texts));
        assert_eq!(ints.client_identifier(), "array");
        assert_eq!(session.clients_for_kind("converter").len(), 1);
    }

    #[test]
    fn test_unknown_type_is_configuration_error() {
        let (session, _handle) = stub_session();
        let err = session.converter("pikachu").unwrap_err();
        assert!(matches!(err, FoundationError::Configuration(_)));
        assert!(!session.has_client("converter", "pikachu"));
    }

    #[test]
    fn test_unknown_kind_lists_poolers() {
        let (session, _handle) = stub_session();
        let err = session.client("pika", "chu").map(|_| ()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Pool usage error: No pooler registered for type 'pika'. Poolers available: \
             {converter, inspector, listener, observer, prepared_query, query_manager}."
        );
    }

    #[test]
    fn test_unregistered_pooler_refuses_lookups() {
        let (session, _handle) = stub_session();
        let pooler = PikaPooler::default();
        let err = pooler.get_client(&session, "chu").map(|_| ()).unwrap_err();
        assert!(err.to_string().contains("is not initialized, session not set."));
    }

    #[test]
    fn test_pooler_registers_once() {
        let (session, _handle) = stub_session();
        let (other, _other_handle) = stub_session();
        let pooler: Arc<dyn Pooler> = Arc::new(PikaPooler::default());

        session.register_pooler(Arc::clone(&pooler)).unwrap();
        let err = other.register_pooler(Arc::clone(&pooler)).unwrap_err();
        assert!(err.to_string().contains("already registered"));

        let err = pooler.get_client(&other, "chu").map(|_| ()).unwrap_err();
        assert!(err.to_string().contains("belongs to session"));

        let client = session.client("pika", "chu").unwrap();
        assert_eq!(client.client_type(), "pika");
        assert_eq!(client.client_identifier(), "chu");
    }

    #[test]
    fn test_lookup_with_wrong_concrete_type_fails() {
        let (session, _handle) = stub_session();
        session.listener("int4").unwrap();
        let err = crate::pool::downcast_client::<crate::converter::ConverterClient>(
            session.client("listener", "int4").unwrap(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("is not a"));
    }
}

// ============================================================================
// Conversion through the session
// ============================================================================

mod conversion {
    use super::*;

    #[test]
    fn test_int4_array_round_trip() {
        let (session, _handle) = stub_session();
        let decoded = session.decode("int4[]", Some("{1,2,NULL,4}")).unwrap();
        assert_eq!(
            decoded,
            PgValue::Array(vec![
                PgValue::Int(1),
                PgValue::Int(2),
                PgValue::Null,
                PgValue::Int(4),
            ])
        );
        assert_eq!(
            session.encode("int4[]", &decoded).unwrap(),
            "ARRAY[int4 '1',int4 '2',NULL::int4,int4 '4']::int4[]"
        );
    }

    #[test]
    fn test_encode_wire_of_null_is_none() {
        let (session, _handle) = stub_session();
        assert_eq!(session.encode_wire("int4", &PgValue::Null).unwrap(), None);
        assert_eq!(
            session.encode_wire("int4", &PgValue::Int(7)).unwrap(),
            Some("7".to_string())
        );
    }

    #[test]
    fn test_custom_converter_from_builder() {
        let converter = Arc::new(
            crate::converter::enumeration::EnumConverter::new("mood", ["sad", "ok", "happy"])
                .unwrap(),
        );
        let builder = SessionBuilder::new(SessionConfig::default())
            .with_converter("Mood", converter, &["mood"])
            .unwrap();
        let (session, _handle) = stub_session_with(builder);

        assert_eq!(
            session.decode("mood", Some("happy")).unwrap(),
            PgValue::Enum("happy".to_string())
        );
        assert!(session.decode("mood", Some("angry")).is_err());
    }
}

// ============================================================================
// Prepared statements
// ============================================================================

mod prepared {
    use super::*;

    #[test]
    fn test_prepares_once_and_deallocates_once() {
        let (session, handle) = stub_session();
        let query = session.prepared_query("select $*::int4 as n").unwrap();

        query.execute(&session, &[PgValue::Int(1)]).unwrap();
        query.execute(&session, &[PgValue::Int(2)]).unwrap();
        assert_eq!(query.status(), PreparationStatus::Prepared);

        let signature = PreparedQuery::signature_for("select $*::int4 as n");
        assert_eq!(handle.count(|c| matches!(c, Call::Prepare(..))), 1);
        assert!(handle
            .calls()
            .contains(&Call::Prepare(signature.clone(), "select $1::int4 as n".to_string())));
        assert!(handle
            .calls()
            .contains(&Call::Execute(signature, vec![Some("2".to_string())])));
        assert_eq!(handle.count(|c| matches!(c, Call::Execute(..))), 2);

        assert!(session.shutdown().is_empty());
        assert_eq!(handle.count(is_anonymous_containing("deallocate")), 1);
    }

    #[test]
    fn test_placeholder_spellings_share_a_statement() {
        let (session, _handle) = stub_session();
        let starred = session.prepared_query("select $*::int4").unwrap();
        let numbered = session.prepared_query("select $1::int4").unwrap();
        assert!(Arc::ptr_eq(&starred, &numbered));
    }

    #[test]
    fn test_reordered_placeholders_are_distinct_statements() {
        let (session, handle) = stub_session();
        let minus = session.prepared_query("select $1::int4 - $2::int4").unwrap();
        let reversed = session.prepared_query("select $2::int4 - $1::int4").unwrap();
        assert!(!Arc::ptr_eq(&minus, &reversed));

        reversed
            .execute(&session, &[PgValue::Int(1), PgValue::Int(5)])
            .unwrap();
        assert_eq!(
            handle.calls().iter().find(|c| matches!(c, Call::Prepare(..))),
            Some(&Call::Prepare(
                PreparedQuery::signature_for("select $2::int4 - $1::int4"),
                "select $2::int4 - $1::int4".to_string(),
            ))
        );
    }

    #[test]
    fn test_unprepared_statement_is_not_deallocated() {
        let (session, handle) = stub_session();
        session.prepared_query("select 1").unwrap();
        assert!(session.shutdown().is_empty());
        assert_eq!(handle.count(is_anonymous_containing("deallocate")), 0);
    }

    #[test]
    fn test_failed_prepare_reverts_status() {
        let (session, handle) = stub_session();
        handle.fail_on("broken");
        let query = session.prepared_query("select broken").unwrap();

        let err = query.execute(&session, &[]).unwrap_err();
        assert!(matches!(err, FoundationError::Sql(_)));
        assert_eq!(query.status(), PreparationStatus::NotPrepared);
        assert_eq!(handle.count(|c| matches!(c, Call::Execute(..))), 0);
    }

    #[test]
    fn test_empty_sql_is_refused_by_the_pooler() {
        let (session, _handle) = stub_session();
        assert!(session.prepared_query("").is_err());
    }
}

// ============================================================================
// Query managers and converted results
// ============================================================================

mod querying {
    use super::*;

    #[test]
    fn test_settings_are_sent_on_build() {
        let (_session, handle) = stub_session();
        let calls = handle.calls();
        match calls.first() {
            Some(Call::Anonymous(sql)) => {
                assert!(sql.contains(r#"set "bytea_output" = 'hex'"#));
                assert!(sql.contains(r#"set "intervalstyle" = 'ISO_8601'"#));
            }
            other => panic!("expected settings query, got {:?}", other),
        }
    }

    #[test]
    fn test_settings_can_be_skipped() {
        let builder = SessionBuilder::new(SessionConfig::default().send_settings(false));
        let (_session, handle) = stub_session_with(builder);
        assert!(handle.calls().is_empty());
    }

    #[test]
    fn test_simple_query_binds_and_converts() {
        let (session, handle) = stub_session();
        handle.clear_calls();
        handle.push_result(
            ResultSet::new(vec![Column::new("n", "int4"), Column::new("tags", "text[]")])
                .with_row([Some("42"), Some("{a,b}")])
                .with_row([Some("43"), None])
                .with_tag("SELECT 2"),
        );

        let result = session
            .query("select $*::int4 + 1 as n, $* as tags", &[PgValue::Int(41), "x".into()])
            .unwrap();

        assert_eq!(
            handle.calls(),
            vec![Call::Parameters(
                "select $1::int4 + 1 as n, $2 as tags".to_string(),
                vec![Some("41".to_string()), Some("x".to_string())],
            )]
        );
        assert_eq!(result.len(), 2);
        assert_eq!(result.affected_rows(), 2);

        let first = result.first().unwrap().unwrap();
        assert_eq!(first.get("n"), Some(&PgValue::Int(42)));
        assert_eq!(
            first.get("tags"),
            Some(&PgValue::Array(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            result.slice("n").unwrap(),
            vec![PgValue::Int(42), PgValue::Int(43)]
        );
        assert_eq!(result.get(1).unwrap().unwrap().get("tags"), Some(&PgValue::Null));
        assert!(result.get(2).unwrap().is_none());
        assert!(result.slice("missing").is_err());
    }

    #[test]
    fn test_prepared_manager_uses_prepared_statements() {
        let (session, handle) = stub_session();
        let manager = session.query_manager(crate::query_manager::PREPARED).unwrap();
        manager.query(&session, "select $*::int4", &[PgValue::Int(1)]).unwrap();
        manager.query(&session, "select $*::int4", &[PgValue::Int(2)]).unwrap();

        assert_eq!(handle.count(|c| matches!(c, Call::Prepare(..))), 1);
        assert_eq!(handle.count(|c| matches!(c, Call::Parameters(..))), 0);
    }

    #[test]
    fn test_unknown_query_manager_is_configuration_error() {
        let (session, _handle) = stub_session();
        let err = session.query_manager("lazy").unwrap_err();
        assert!(matches!(err, FoundationError::Configuration(_)));
    }

    #[test]
    fn test_sql_error_surfaces() {
        let (session, handle) = stub_session();
        handle.fail_on("nope");
        let err = session.query("select nope", &[]).unwrap_err();
        assert_eq!(err.sql_state(), Some("42000"));
    }
}

// ============================================================================
// Listeners and observers
// ============================================================================

mod events {
    use super::*;

    fn recording(session: &Session, name: &str) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session
            .listener(name)
            .unwrap()
            .attach_action(move |event, _data, _session| {
                sink.lock().push(event.to_string());
                Ok(())
            });
        seen
    }

    #[test]
    fn test_query_events_reach_the_query_listener() {
        let (session, _handle) = stub_session();
        let seen = recording(&session, "query");
        let pre = recording(&session, "query:pre");

        session.query("select 1", &[]).unwrap();

        assert_eq!(*seen.lock(), vec!["query:pre", "query:post"]);
        assert_eq!(*pre.lock(), vec!["query:pre"]);
    }

    #[test]
    fn test_event_payloads() {
        let (session, _handle) = stub_session();
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&payloads);
        session
            .listener("query:pre")
            .unwrap()
            .attach_action(move |_event, data, _session| {
                sink.lock().push(data.clone());
                Ok(())
            });

        session.query("select $*", &[PgValue::Int(5)]).unwrap();
        let payloads = payloads.lock();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["sql"], json!("select $*"));
        assert_eq!(payloads[0]["parameters"], json!(["5"]));
        assert_eq!(payloads[0]["session_stamp"], json!("test"));
    }

    #[test]
    fn test_star_reaches_every_listener() {
        let (session, _handle) = stub_session();
        let a = recording(&session, "a");
        let b = recording(&session, "b:c");

        session.notify(&["*"], &json!({})).unwrap();

        assert_eq!(*a.lock(), vec!["a"]);
        assert_eq!(*b.lock(), vec!["b:c"]);
    }

    #[test]
    fn test_notify_never_creates_listeners() {
        let (session, _handle) = stub_session();
        session.notify(&["nobody", "nobody:home"], &json!(null)).unwrap();
        assert!(session.clients_for_kind("listener").is_empty());
    }

    #[test]
    fn test_failing_action_stops_notification() {
        let (session, _handle) = stub_session();
        session
            .listener("query")
            .unwrap()
            .attach_action(|_, _, _| Err(FoundationError::PoolUsage("stop".to_string())));
        assert!(session.query("select 1", &[]).is_err());
    }

    #[test]
    fn test_observer_listens_and_unlistens() {
        let (session, handle) = stub_session();
        session.observer("news").unwrap();
        assert!(handle.calls().contains(&Call::Anonymous(r#"listen "news""#.to_string())));

        session.remove_client("observer", "news").unwrap();
        assert!(handle.calls().contains(&Call::Anonymous(r#"unlisten "news""#.to_string())));
    }

    #[test]
    fn test_observer_throws_pending_notification() {
        let (session, handle) = stub_session();
        let observer = session.observer("news").unwrap();
        assert!(observer.throw_notification(&session).is_ok());

        handle.push_notification("news", 42, "hello");
        match observer.throw_notification(&session) {
            Err(FoundationError::Notification {
                channel,
                pid,
                payload,
            }) => {
                assert_eq!(channel, "news");
                assert_eq!(pid, 42);
                assert_eq!(payload, "hello");
            }
            other => panic!("expected a notification, got {:?}", other),
        }
        assert!(observer.get_notification(&session).unwrap().is_none());
    }
}

// ============================================================================
// Inspector
// ============================================================================

mod inspector {
    use super::*;

    #[test]
    fn test_server_version() {
        let (session, handle) = stub_session();
        handle.push_result(
            ResultSet::new(vec![Column::new("server_version", "text")]).with_row([Some("16.2")]),
        );
        let version = session.inspector().unwrap().server_version(&session).unwrap();
        assert_eq!(version, "16.2");
    }

    #[test]
    fn test_table_oid() {
        let (session, handle) = stub_session();
        handle.push_result(ResultSet::new(vec![Column::new("oid", "oid")]).with_row([Some("16384")]));
        let inspector = session.inspector().unwrap();

        assert_eq!(inspector.table_oid(&session, "public", "users").unwrap(), Some(16384));
        assert!(handle.calls().iter().any(|c| matches!(
            c,
            Call::Execute(_, params)
                if params == &vec![Some("public".to_string()), Some("users".to_string())]
        )));

        assert_eq!(inspector.table_oid(&session, "public", "ghosts").unwrap(), None);
    }

    #[test]
    fn test_table_field_information() {
        let (session, handle) = stub_session();
        handle.push_result(
            ResultSet::new(vec![
                Column::new("name", "name"),
                Column::new("type", "text"),
                Column::new("default", "text"),
                Column::new("is_notnull", "bool"),
                Column::new("comment", "text"),
                Column::new("position", "int2"),
                Column::new("is_primary", "bool"),
            ])
            .with_row([Some("id"), Some("int4"), Some("nextval('s')"), Some("t"), None, Some("1"), Some("t")])
            .with_row([Some("name"), Some("text"), None, Some("f"), Some("who"), Some("2"), None]),
        );

        let fields = session
            .inspector()
            .unwrap()
            .table_field_information(&session, 16384)
            .unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "id");
        assert!(fields[0].is_primary);
        assert_eq!(fields[0].default.as_deref(), Some("nextval('s')"));
        assert_eq!(fields[1].comment.as_deref(), Some("who"));
        assert!(!fields[1].is_notnull);
        assert!(!fields[1].is_primary);
        assert_eq!(fields[1].position, 2);
    }
}

// ============================================================================
// Builder hooks
// ============================================================================

mod building {
    use super::*;

    #[test]
    fn test_custom_pooler_and_post_build_hook() {
        let builder = SessionBuilder::new(SessionConfig::default())
            .with_pooler(|| Arc::new(PikaPooler::default()) as Arc<dyn Pooler>)
            .post_build(|session| {
                session.listener("boot")?;
                Ok(())
            });

        let (first, _handle) = stub_session_with(builder);
        assert!(first.has_pooler("pika"));
        assert!(first.has_client("listener", "boot"));
        assert_eq!(first.stamp(), Some("test"));
        assert_eq!(first.client("pika", "chu").unwrap().client_identifier(), "chu");
    }

    #[test]
    fn test_failing_hook_fails_the_build() {
        let builder = SessionBuilder::default()
            .post_build(|_| Err(FoundationError::Configuration("no".to_string())));
        let (connection, _handle) = crate::testing::StubConnection::new();
        let err = builder.build_session(Box::new(connection), None).unwrap_err();
        assert!(matches!(err, FoundationError::Configuration(_)));
    }
}

// ============================================================================
// Shutdown
// ============================================================================

mod shutdown {
    use super::*;

    #[test]
    fn test_shutdown_collects_every_error() {
        let (session, handle) = stub_session();
        handle.fail_on("unlisten");
        session.observer("one").unwrap();
        session.observer("two").unwrap();
        session.converter("int4").unwrap();

        let errors = session.shutdown();
        assert_eq!(errors.len(), 2);
        assert_eq!(handle.count(is_anonymous_containing("unlisten")), 2);
        assert!(handle.is_closed());
        assert_eq!(handle.calls().last(), Some(&Call::Close));
        assert!(session.is_shutdown());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (session, handle) = stub_session();
        session.observer("one").unwrap();
        assert!(session.shutdown().is_empty());
        assert!(session.shutdown().is_empty());
        assert_eq!(handle.count(|c| *c == Call::Close), 1);
        assert_eq!(handle.count(is_anonymous_containing("unlisten")), 1);
    }

    #[test]
    fn test_drop_shuts_down() {
        let (session, handle) = stub_session();
        session.observer("one").unwrap();
        drop(session);
        assert!(handle.is_closed());
        assert_eq!(handle.count(is_anonymous_containing("unlisten")), 1);
    }

    #[test]
    fn test_lookups_after_shutdown_fail() {
        let (session, _handle) = stub_session();
        session.shutdown();

        let err = session.converter("int4").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Pool usage error: There are no poolers in the session because it is shutdown."
        );
        assert!(session.connection().is_err());
        assert!(session
            .register_pooler(Arc::new(PikaPooler::default()))
            .is_err());
        assert!(session.pooled_client("converter", "int4").is_err());
    }
}
