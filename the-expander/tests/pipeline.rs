use std::{
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use the_expander::{
  Collaborators,
  Lifecycle,
  Orchestrator,
  Outcome,
  Session,
  SharedPage,
  config::Config,
  session,
};
use the_lib::{
  content::ResolvedContent,
  insert::Strategy,
  position,
  remote::{
    self,
    PopupHost,
    PopupRequest,
    ShortcutResolver,
  },
  store::{
    MemoryStore,
    Store,
    keys,
  },
  surface::{
    EditableSurface,
    FieldKind,
    Page,
    PlainField,
    RichSurface,
    SurfaceId,
    SurfaceIdentity,
  },
  range,
  tree::{
    Anchor,
    ContentTree,
    NodeId,
    NodeKind,
    TreeRange,
  },
};
use tokio::{
  sync::broadcast,
  time::{
    sleep,
    timeout,
  },
};

const KEY_DELAY: Duration = Duration::from_millis(30);

struct Harness {
  page:         SharedPage,
  surface:      SurfaceId,
  store:        Arc<MemoryStore>,
  orchestrator: Orchestrator,
}

impl Harness {
  fn new(
    surface: impl Into<EditableSurface>,
    customize: impl FnOnce(Collaborators) -> Collaborators,
  ) -> Self {
    let mut page = Page::new();
    let surface = page.add(SurfaceIdentity::new("body/div[0]/textarea[0]"), surface);
    page.focus(surface);
    let page = Arc::new(Mutex::new(page));
    let store = Arc::new(MemoryStore::new());
    store
      .set(
        keys::LIBRARY,
        json!({
          "/hi": { "body": "Hi there" },
          "/sig": { "body": "Regards, {name}", "hasInteractiveFields": true },
        }),
      )
      .unwrap();
    let collab = customize(Collaborators::new(store.clone()));
    let orchestrator = Orchestrator::start(page.clone(), collab, &Config::default());
    Self {
      page,
      surface,
      store,
      orchestrator,
    }
  }

  fn textarea(text: &str) -> Self {
    Self::new(PlainField::new(FieldKind::MultiLine, text), |collab| collab)
  }

  async fn type_text(&self, text: &str) {
    for ch in text.chars() {
      self
        .page
        .lock()
        .get_mut(self.surface)
        .unwrap()
        .type_text(&ch.to_string())
        .unwrap();
      self.orchestrator.on_edit();
      sleep(KEY_DELAY).await;
    }
  }

  fn text(&self) -> String {
    self.page.lock().get(self.surface).unwrap().text()
  }

  fn caret(&self) -> usize {
    position::capture(self.page.lock().get(self.surface).unwrap())
      .unwrap()
      .start
  }

  fn with_field(&self, edit: impl FnOnce(&mut PlainField)) {
    let mut page = self.page.lock();
    match page.get_mut(self.surface).unwrap() {
      EditableSurface::PlainField(field) => edit(field),
      EditableSurface::RichSurface(_) => panic!("not a plain field"),
    }
  }

  fn with_rich<T>(&self, inspect: impl FnOnce(&mut RichSurface) -> T) -> T {
    let mut page = self.page.lock();
    match page.get_mut(self.surface).unwrap() {
      EditableSurface::RichSurface(surface) => inspect(surface),
      EditableSurface::PlainField(_) => panic!("not a rich surface"),
    }
  }
}

fn two_paragraphs(first: &str, second: &str) -> (RichSurface, [NodeId; 2]) {
  let mut tree = ContentTree::new("div");
  let p = tree.append_element(tree.root(), "p").unwrap();
  let first = tree.append_text(p, first).unwrap();
  let p = tree.append_element(tree.root(), "p").unwrap();
  let second = tree.append_text(p, second).unwrap();
  let mut surface = RichSurface::new(tree);
  let len = surface.text().chars().count();
  surface.select(len, len).unwrap();
  (surface, [first, second])
}

async fn next_outcome(outcomes: &mut broadcast::Receiver<Outcome>) -> Outcome {
  timeout(Duration::from_secs(10), outcomes.recv())
    .await
    .expect("no outcome reported")
    .unwrap()
}

/// Resolves `/zz` after a long round trip.
struct SlowResolver;

#[async_trait]
impl ShortcutResolver for SlowResolver {
  async fn fetch_shortcut(&self, name: &str) -> remote::Result<Option<ResolvedContent>> {
    sleep(Duration::from_secs(1)).await;
    Ok((name == "/zz").then(|| ResolvedContent::plain(name, "zebra")))
  }
}

#[derive(Default)]
struct RecordingPopup {
  requests: Mutex<Vec<PopupRequest>>,
}

#[async_trait]
impl PopupHost for RecordingPopup {
  async fn open_window(&self, request: PopupRequest) -> remote::Result<()> {
    self.requests.lock().push(request);
    Ok(())
  }
}

#[tokio::test(start_paused = true)]
async fn textarea_shortcut_expands_after_typing_pause() {
  let harness = Harness::textarea("");
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/hi").await;
  let outcome = next_outcome(&mut outcomes).await;

  assert_eq!(outcome, Outcome::Inserted {
    surface:   harness.surface,
    shortcut:  "/hi".into(),
    strategy:  Strategy::ReplaceRange,
    new_caret: 8,
  });
  assert_eq!(harness.text(), "Hi there");
  assert_eq!(harness.caret(), 8);

  let stored = position::load(harness.store.as_ref()).unwrap().unwrap();
  assert_eq!((stored.start, stored.end), (8, 8));
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_runs_detection_once() {
  let harness = Harness::textarea("well ");
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/hi").await;
  sleep(Duration::from_secs(2)).await;

  assert!(matches!(outcomes.try_recv(), Ok(Outcome::Inserted { .. })));
  assert!(outcomes.try_recv().is_err());
  assert_eq!(harness.text(), "well Hi there");
}

#[tokio::test(start_paused = true)]
async fn rich_surface_only_touches_the_shortcut() {
  let mut tree = ContentTree::new("div");
  let intro = tree.append_element(tree.root(), "p").unwrap();
  tree.append_text(intro, "Intro").unwrap();
  let body = tree.append_element(tree.root(), "p").unwrap();
  tree.append_text(body, "say ").unwrap();
  let mut surface = RichSurface::new(tree);
  surface.select(9, 9).unwrap();

  let harness = Harness::new(surface, |collab| collab);
  let mut outcomes = harness.orchestrator.subscribe();
  harness.type_text("/hi").await;

  let outcome = next_outcome(&mut outcomes).await;
  assert!(matches!(outcome, Outcome::Inserted {
    strategy: Strategy::InputEvents,
    new_caret: 17,
    ..
  }));
  assert_eq!(harness.text(), "Introsay Hi there");

  let page = harness.page.lock();
  let EditableSurface::RichSurface(surface) = page.get(harness.surface).unwrap() else {
    panic!("not a rich surface");
  };
  let first = surface.tree().get(intro).unwrap().children()[0];
  let untouched = TreeRange::new(Anchor::new(first, 0), Anchor::new(first, 5));
  assert_eq!(surface.tree().text_in(untouched), Some("Intro".into()));
}

#[tokio::test(start_paused = true)]
async fn edits_during_resolution_abort_silently() {
  let harness = Harness::new(PlainField::new(FieldKind::MultiLine, ""), |collab| {
    collab.with_resolver(Arc::new(SlowResolver))
  });
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/zz").await;
  // Detection fires once the debounce elapses; the lookup is still in flight
  // when the user deletes the slash.
  sleep(Duration::from_millis(700)).await;
  harness.with_field(|field| {
    field.replace_range(0, 1, "");
  });

  let outcome = next_outcome(&mut outcomes).await;
  assert_eq!(outcome, Outcome::Stale {
    shortcut: "/zz".into(),
  });
  assert_eq!(harness.text(), "zz");
}

#[tokio::test(start_paused = true)]
async fn teardown_during_resolution_reports_inactive() {
  let harness = Harness::new(PlainField::new(FieldKind::MultiLine, ""), |collab| {
    collab.with_resolver(Arc::new(SlowResolver))
  });
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/zz").await;
  sleep(Duration::from_millis(700)).await;
  let Harness {
    page,
    surface,
    orchestrator,
    ..
  } = harness;
  orchestrator.shutdown();

  let outcome = next_outcome(&mut outcomes).await;
  assert_eq!(outcome, Outcome::Inactive);
  assert_eq!(page.lock().get(surface).unwrap().text(), "/zz");
}

#[tokio::test(start_paused = true)]
async fn interactive_content_goes_through_the_popup() {
  let popup = Arc::new(RecordingPopup::default());
  let harness = Harness::new(PlainField::new(FieldKind::MultiLine, "Hello "), {
    let popup = popup.clone();
    move |collab| collab.with_popup(popup)
  });
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/sig").await;
  assert_eq!(next_outcome(&mut outcomes).await, Outcome::Deferred {
    shortcut: "/sig".into(),
  });
  assert_eq!(harness.text(), "Hello /sig");
  assert!(harness.store.get(keys::PENDING).is_some());
  {
    let requests = popup.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].title, "/sig");
  }

  let outcome = harness.orchestrator.submit_popup("Regards, Ana");
  assert!(matches!(outcome, Outcome::Inserted { new_caret: 18, .. }));
  assert_eq!(harness.text(), "Hello Regards, Ana");
  assert!(harness.store.get(keys::PENDING).is_none());
}

#[tokio::test(start_paused = true)]
async fn popup_text_falls_back_to_the_caret_when_the_span_moved() {
  let popup = Arc::new(RecordingPopup::default());
  let harness = Harness::new(PlainField::new(FieldKind::MultiLine, "Hello "), {
    let popup = popup.clone();
    move |collab| collab.with_popup(popup)
  });
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/sig").await;
  assert!(matches!(next_outcome(&mut outcomes).await, Outcome::Deferred { .. }));

  harness.with_field(|field| {
    field.replace_range(0, 0, "Oh ");
    let len = field.len_chars();
    field.set_selection(len, len);
  });

  let outcome = harness.orchestrator.submit_popup("Done");
  assert!(matches!(outcome, Outcome::Inserted { new_caret: 17, .. }));
  assert_eq!(harness.text(), "Oh Hello /sigDone");
}

#[tokio::test(start_paused = true)]
async fn rich_popup_text_replaces_the_stored_span() {
  let popup = Arc::new(RecordingPopup::default());
  let (surface, [intro, body]) = two_paragraphs("Intro", "say ");
  let harness = Harness::new(surface, {
    let popup = popup.clone();
    move |collab| collab.with_popup(popup)
  });
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/sig").await;
  assert!(matches!(next_outcome(&mut outcomes).await, Outcome::Deferred { .. }));
  assert_eq!(popup.requests.lock().len(), 1);

  let outcome = harness.orchestrator.submit_popup("Regards, Ana");
  assert!(matches!(outcome, Outcome::Inserted { new_caret: 21, .. }));
  assert!(harness.store.get(keys::PENDING).is_none());

  harness.with_rich(|surface| {
    let tree = surface.tree();
    assert_eq!(tree.get(intro).unwrap().kind(), &NodeKind::Text("Intro".into()));
    assert_eq!(tree.get(body).unwrap().kind(), &NodeKind::Text("say Regards, Ana".into()));
    assert_eq!(surface.selection_offsets(), Some((21, 21)));
  });
}

#[tokio::test(start_paused = true)]
async fn rich_popup_text_lands_at_the_caret_when_the_span_changed() {
  let popup = Arc::new(RecordingPopup::default());
  let (surface, [dear, bye]) = two_paragraphs("Dear ", "Bye ");
  let harness = Harness::new(surface, {
    let popup = popup.clone();
    move |collab| collab.with_popup(popup)
  });
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/sig").await;
  assert!(matches!(next_outcome(&mut outcomes).await, Outcome::Deferred { .. }));

  // The slash goes away and the caret returns to the end of the greeting.
  harness.with_rich(|surface| {
    let slash = range::locate(surface.tree(), 9, 10).unwrap();
    surface.replace(slash, "").unwrap();
    surface.set_selection(Some(TreeRange::collapsed(Anchor::new(dear, 5))));
  });

  let outcome = harness.orchestrator.submit_popup("team");
  assert!(matches!(outcome, Outcome::Inserted { new_caret: 9, .. }));

  harness.with_rich(|surface| {
    let tree = surface.tree();
    assert_eq!(tree.get(dear).unwrap().kind(), &NodeKind::Text("Dear team".into()));
    assert_eq!(tree.get(bye).unwrap().kind(), &NodeKind::Text("Bye sig".into()));
    assert_eq!(surface.selection_offsets(), Some((9, 9)));
  });
}

#[tokio::test(start_paused = true)]
async fn caret_moves_are_persisted_without_detection() {
  let harness = Harness::textarea("hello world");
  let mut outcomes = harness.orchestrator.subscribe();

  harness.with_field(|field| field.set_selection(2, 2));
  harness.orchestrator.on_caret_move();
  sleep(Duration::from_millis(150)).await;

  let stored = position::load(harness.store.as_ref()).unwrap().unwrap();
  assert_eq!((stored.start, stored.end), (2, 2));

  sleep(Duration::from_secs(1)).await;
  assert!(outcomes.try_recv().is_err());
  assert_eq!(harness.text(), "hello world");
}

#[tokio::test(start_paused = true)]
async fn interactive_content_without_popup_fails() {
  let harness = Harness::textarea("");
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("/sig").await;
  assert_eq!(next_outcome(&mut outcomes).await, Outcome::Failed {
    shortcut: "/sig".into(),
    reason:   "popup unavailable".into(),
  });
  assert_eq!(harness.text(), "/sig");
}

#[tokio::test(start_paused = true)]
async fn unknown_words_are_left_alone() {
  let harness = Harness::textarea("");
  let mut outcomes = harness.orchestrator.subscribe();

  harness.type_text("plain words").await;
  assert_eq!(next_outcome(&mut outcomes).await, Outcome::NoMatch);
  assert_eq!(harness.text(), "plain words");
}

#[tokio::test(start_paused = true)]
async fn session_flag_gates_the_pipeline() {
  let mut page = Page::new();
  let surface = page.add(
    SurfaceIdentity::new("body/input[0]"),
    PlainField::new(FieldKind::SingleLine, "/hi"),
  );
  page.focus(surface);
  let page = Arc::new(Mutex::new(page));
  let store = Arc::new(MemoryStore::new());
  store
    .set(keys::LIBRARY, json!({ "/hi": { "body": "Hi there" } }))
    .unwrap();

  let session = Arc::new(Mutex::new(Session::new(
    page.clone(),
    Collaborators::new(store.clone()),
    Config::default(),
  )));
  session.lock().sync();
  let watcher = session::watch(session.clone());

  assert!(!session.lock().on_edit());
  sleep(Duration::from_secs(1)).await;
  assert_eq!(page.lock().get(surface).unwrap().text(), "/hi");

  store.set(keys::SESSION, json!(true)).unwrap();
  sleep(Duration::from_millis(1)).await;
  assert_eq!(session.lock().lifecycle(), Lifecycle::Active);

  let mut outcomes = session.lock().orchestrator().unwrap().subscribe();
  assert!(session.lock().on_edit());
  assert!(matches!(next_outcome(&mut outcomes).await, Outcome::Inserted { .. }));
  assert_eq!(page.lock().get(surface).unwrap().text(), "Hi there");

  store.remove(keys::SESSION).unwrap();
  sleep(Duration::from_millis(1)).await;
  assert_eq!(session.lock().lifecycle(), Lifecycle::TornDown);
  assert!(!session.lock().on_edit());

  watcher.abort();
}
