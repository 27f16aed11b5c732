//! Friend request state machine against SQLite

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use taskmate_broker::MessageHandler;
use taskmate_db::entities::friend::{self, FriendStatus};
use taskmate_db::{connect, migrate};
use taskmate_proto::{Action, Envelope};
use taskmate_relations::{FriendActionHandler, FriendService, RelationError};

async fn setup_test_db() -> DatabaseConnection {
    let db = connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    migrate(&db).await.expect("Failed to run migrations");
    db
}

async fn insert_edge(
    db: &DatabaseConnection,
    id: i32,
    user_id: i32,
    friend_id: i32,
    status: FriendStatus,
) {
    let now = Utc::now();
    friend::ActiveModel {
        id: Set(id),
        user_id: Set(user_id),
        friend_id: Set(friend_id),
        status: Set(status),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("Failed to insert edge");
}

/// (id, user_id, friend_id, status) for every edge, by id
async fn edges(db: &DatabaseConnection) -> Vec<(i32, i32, i32, FriendStatus)> {
    friend::Entity::find()
        .order_by_asc(friend::Column::Id)
        .all(db)
        .await
        .unwrap()
        .into_iter()
        .map(|edge| (edge.id, edge.user_id, edge.friend_id, edge.status))
        .collect()
}

#[tokio::test]
async fn test_accept_envelope_creates_mutual_friendship() {
    let db = setup_test_db().await;
    insert_edge(&db, 7, 1, 2, FriendStatus::Pending).await;

    let handler = FriendActionHandler::new(FriendService::new(db.clone()));
    handler
        .handle(Envelope::friend(Action::Accept, 7, 1, 2))
        .await
        .unwrap();

    let all = edges(&db).await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], (7, 1, 2, FriendStatus::Accepted));
    assert_eq!((all[1].1, all[1].2, all[1].3), (2, 1, FriendStatus::Accepted));
}

#[tokio::test]
async fn test_accept_is_idempotent() {
    let db = setup_test_db().await;
    insert_edge(&db, 7, 1, 2, FriendStatus::Pending).await;

    let service = FriendService::new(db.clone());
    service.accept_friend_request(1, 2).await.unwrap();
    let after_first = edges(&db).await;

    service.accept_friend_request(1, 2).await.unwrap();
    service.accept_friend_request(1, 2).await.unwrap();

    assert_eq!(edges(&db).await, after_first);
    assert_eq!(after_first.len(), 2);
}

#[tokio::test]
async fn test_accept_removes_duplicates_when_already_friends() {
    let db = setup_test_db().await;
    insert_edge(&db, 1, 1, 2, FriendStatus::Accepted).await;
    insert_edge(&db, 2, 2, 1, FriendStatus::Accepted).await;
    insert_edge(&db, 3, 1, 2, FriendStatus::Pending).await;
    insert_edge(&db, 4, 2, 1, FriendStatus::Accepted).await;

    FriendService::new(db.clone())
        .accept_friend_request(1, 2)
        .await
        .unwrap();

    assert_eq!(
        edges(&db).await,
        vec![
            (1, 1, 2, FriendStatus::Accepted),
            (4, 2, 1, FriendStatus::Accepted),
        ]
    );
}

#[tokio::test]
async fn test_accept_with_duplicate_pending_requests() {
    let db = setup_test_db().await;
    insert_edge(&db, 1, 1, 2, FriendStatus::Pending).await;
    insert_edge(&db, 2, 1, 2, FriendStatus::Pending).await;

    FriendService::new(db.clone())
        .accept_friend_request(1, 2)
        .await
        .unwrap();

    let all = edges(&db).await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], (2, 1, 2, FriendStatus::Accepted));
    assert_eq!((all[1].1, all[1].2, all[1].3), (2, 1, FriendStatus::Accepted));
}

#[tokio::test]
async fn test_accept_reuses_opposite_request() {
    let db = setup_test_db().await;
    insert_edge(&db, 1, 1, 2, FriendStatus::Pending).await;
    insert_edge(&db, 2, 2, 1, FriendStatus::Pending).await;

    FriendService::new(db.clone())
        .accept_friend_request(1, 2)
        .await
        .unwrap();

    assert_eq!(
        edges(&db).await,
        vec![
            (1, 1, 2, FriendStatus::Accepted),
            (2, 2, 1, FriendStatus::Accepted),
        ]
    );
}

#[tokio::test]
async fn test_accept_withdrawn_request_is_a_no_op() {
    let db = setup_test_db().await;

    FriendService::new(db.clone())
        .accept_friend_request(1, 2)
        .await
        .unwrap();

    assert!(edges(&db).await.is_empty());
}

#[tokio::test]
async fn test_failed_accept_rolls_back() {
    let db = setup_test_db().await;
    insert_edge(&db, 7, 1, 2, FriendStatus::Pending).await;

    // Refuse the reciprocal edge so the transaction fails half way
    db.execute_unprepared(
        "CREATE TRIGGER refuse_reciprocal BEFORE INSERT ON friends \
         FOR EACH ROW WHEN NEW.user_id = 2 \
         BEGIN SELECT RAISE(ABORT, 'reciprocal edge refused'); END;",
    )
    .await
    .unwrap();

    let service = FriendService::new(db.clone());
    let result = service.accept_friend_request(1, 2).await;
    assert!(matches!(result, Err(RelationError::Database(_))));

    assert_eq!(edges(&db).await, vec![(7, 1, 2, FriendStatus::Pending)]);

    // Once the store recovers the redelivered envelope succeeds
    db.execute_unprepared("DROP TRIGGER refuse_reciprocal")
        .await
        .unwrap();
    service.accept_friend_request(1, 2).await.unwrap();
    assert_eq!(edges(&db).await.len(), 2);
}

#[tokio::test]
async fn test_handler_surfaces_store_errors() {
    let db = setup_test_db().await;
    insert_edge(&db, 7, 1, 2, FriendStatus::Pending).await;
    db.execute_unprepared("DROP TABLE friends").await.unwrap();

    let handler = FriendActionHandler::new(FriendService::new(db.clone()));
    let result = handler
        .handle(Envelope::friend(Action::Accept, 7, 1, 2))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_reject_deletes_request() {
    let db = setup_test_db().await;
    insert_edge(&db, 7, 1, 2, FriendStatus::Pending).await;

    let handler = FriendActionHandler::new(FriendService::new(db.clone()));
    handler
        .handle(Envelope::friend(Action::Reject, 7, 1, 2))
        .await
        .unwrap();
    assert!(edges(&db).await.is_empty());

    // Redelivery of the same rejection
    handler
        .handle(Envelope::friend(Action::Reject, 7, 1, 2))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_late_reject_keeps_accepted_friendship() {
    let db = setup_test_db().await;
    insert_edge(&db, 7, 1, 2, FriendStatus::Pending).await;

    let handler = FriendActionHandler::new(FriendService::new(db.clone()));
    handler
        .handle(Envelope::friend(Action::Accept, 7, 1, 2))
        .await
        .unwrap();
    // Rejection for the same request arrives after the accept
    handler
        .handle(Envelope::friend(Action::Reject, 7, 1, 2))
        .await
        .unwrap();

    let edges = edges(&db).await;
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0], (7, 1, 2, FriendStatus::Accepted));
    assert_eq!(
        (edges[1].1, edges[1].2, edges[1].3),
        (2, 1, FriendStatus::Accepted)
    );
}

#[tokio::test]
async fn test_team_envelope_is_dropped() {
    let db = setup_test_db().await;
    insert_edge(&db, 7, 1, 2, FriendStatus::Pending).await;

    let handler = FriendActionHandler::new(FriendService::new(db.clone()));
    handler
        .handle(Envelope::team(Action::Accept, 7, 1, 2))
        .await
        .unwrap();

    assert_eq!(edges(&db).await, vec![(7, 1, 2, FriendStatus::Pending)]);
}

#[tokio::test]
async fn test_add_friend_request_does_not_duplicate() {
    let db = setup_test_db().await;
    let service = FriendService::new(db.clone());

    let first = service.add_friend_request(1, 2).await.unwrap();
    let second = service.add_friend_request(1, 2).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.status, FriendStatus::Pending);

    service.accept_friend_request(1, 2).await.unwrap();
    let again = service.add_friend_request(1, 2).await.unwrap();
    assert_eq!(again.status, FriendStatus::Accepted);
    assert_eq!(edges(&db).await.len(), 2);

    assert!(matches!(
        service.add_friend_request(3, 3).await,
        Err(RelationError::SelfRelation)
    ));
}

#[tokio::test]
async fn test_delete_friend_and_lookups() {
    let db = setup_test_db().await;
    let service = FriendService::new(db.clone());

    service.add_friend_request(1, 2).await.unwrap();
    service.accept_friend_request(1, 2).await.unwrap();

    assert_eq!(service.friends_of(1).await.unwrap(), vec![2]);
    assert_eq!(service.friends_of(2).await.unwrap(), vec![1]);
    assert!(service.relation(2, 1).await.unwrap().is_some());

    service.delete_friend(2, 1).await.unwrap();

    assert!(service.relation(1, 2).await.unwrap().is_none());
    assert!(service.relation(2, 1).await.unwrap().is_none());
    assert!(service.friends_of(1).await.unwrap().is_empty());
}
