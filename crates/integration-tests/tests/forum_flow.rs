mod common;

use common::Client;
use kf_app::thread_list::EMPTY_LIST_MESSAGE;
use kf_app::View;
use kf_core::Tag;
use kf_db_memory::MemoryForumStore;
use askama::Template;
use kf_ui::{ThreadListPage, ThreadPage};

#[tokio::test]
async fn guest_signs_in_posts_a_thread_and_replies() {
    let store = MemoryForumStore::new();
    let mut neo = Client::guest(&store).await;

    assert_eq!(neo.app.status_line(), "Not logged in");
    assert!(neo.app.capabilities().show_auth_box);
    assert_eq!(neo.app.list.empty_message(), Some(EMPTY_LIST_MESSAGE));
    let html = ThreadListPage::from_app(&neo.app).render().unwrap();
    assert!(!html.contains("class=\"compose\""));

    neo.app.list.compose.title = "Hello".into();
    neo.app.list.compose.body = "World".into();
    let err = neo.app.create_thread().await.unwrap_err();
    assert_eq!(err.inline_message(), "Log in to create a thread.");

    neo.register("neo@zion.io", "Neo").await;
    assert_eq!(neo.app.status_line(), "Logged in as: Neo");
    assert!(neo.app.capabilities().can_create_thread);
    let html = ThreadListPage::from_app(&neo.app).render().unwrap();
    assert!(html.contains("class=\"compose\""));

    neo.app.list.compose.toggle_tag(Tag::Question);
    let id = neo.app.create_thread().await.unwrap();
    assert_eq!(neo.app.view(), View::Thread(id));
    assert!(neo.app.list.compose.title.is_empty());

    neo.app.pump().await;
    let cards = neo.app.list.visible();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].title, "Hello");
    assert_eq!(cards[0].author, "Neo");
    assert_eq!(cards[0].tags, vec![Tag::Question]);
    assert_eq!(cards[0].reply_count, 0);
    let html = ThreadListPage::from_app(&neo.app).render().unwrap();
    assert!(html.contains("<li class=\"tag-pill\">Question</li>"));

    neo.app.detail.reply_draft = "Hi there".into();
    neo.app.post_reply().await.unwrap();
    assert!(neo.app.detail.reply_draft.is_empty());
    neo.app.pump().await;

    let header = neo.app.detail.header(neo.app.session()).unwrap();
    assert_eq!(header.reply_count, 1);
    let replies = neo.app.detail.reply_views(neo.app.session());
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text, "Hi there");
    assert_eq!(replies[0].author, "Neo");
    assert_eq!(neo.app.list.visible()[0].reply_count, 1);

    let html = ThreadPage::from_app(&neo.app).unwrap().render().unwrap();
    assert!(html.contains("Hi there"));
    assert!(html.contains("data-action=\"delete-thread\""));
}

#[tokio::test]
async fn other_clients_see_new_threads_live() {
    let store = MemoryForumStore::new();
    let mut viewer = Client::guest(&store).await;
    let mut trinity = Client::member(&store, "trinity@zion.io", "Trinity").await;

    trinity.app.list.compose.title = "  ".into();
    trinity.app.list.compose.body = "no title".into();
    assert_eq!(
        trinity.app.create_thread().await.unwrap_err().inline_message(),
        "Title and body are required."
    );
    assert_eq!(
        trinity.app.list.compose.error.as_deref(),
        Some("Title and body are required.")
    );

    trinity.app.list.compose.title = "Kino night".into();
    trinity.app.list.compose.body = "Who is in?".into();
    trinity.app.create_thread().await.unwrap();

    viewer.app.pump().await;
    assert_eq!(viewer.app.list.visible().len(), 1);
    assert_eq!(viewer.app.list.visible()[0].author, "Trinity");

    viewer.app.list.set_query("nothing matches this");
    assert_eq!(viewer.app.list.empty_message(), Some(EMPTY_LIST_MESSAGE));
    let html = ThreadListPage::from_app(&viewer.app).render().unwrap();
    assert!(html.contains(EMPTY_LIST_MESSAGE));
    assert!(html.contains("Not logged in"));
}

#[tokio::test]
async fn author_deleting_open_thread_returns_to_list() {
    let store = MemoryForumStore::new();
    let mut neo = Client::member(&store, "neo@zion.io", "Neo").await;
    neo.app.list.compose.title = "Bye".into();
    neo.app.list.compose.body = "soon gone".into();
    let id = neo.app.create_thread().await.unwrap();
    neo.app.pump().await;

    let confirm = common::answer_next(neo.dialogs(), kf_app::dialog::DialogChoice::Confirm);
    assert!(neo.app.delete_thread().await.unwrap());
    assert_eq!(confirm.await.unwrap().title, "Delete thread");
    assert_eq!(neo.app.view(), View::List);
    assert!(!neo.app.detail.is_open());

    neo.app.pump().await;
    assert!(neo.app.list.visible().iter().all(|c| c.id != id));
}
