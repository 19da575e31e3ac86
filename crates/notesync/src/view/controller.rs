use super::render::{HomeView, NotFoundView, NotesView, ProfileView, Renderer, View};
use super::route::Route;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::model::{Note, NoteId};
use crate::store::RealtimeStore;
use chrono::Utc;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

/// Everything a view controller needs, handed in at construction.
pub struct AppContext<S: RealtimeStore> {
    pub gateway: Gateway<S>,
    pub renderer: Box<dyn Renderer>,
}

impl<S: RealtimeStore> AppContext<S> {
    pub fn new(gateway: Gateway<S>, renderer: impl Renderer + 'static) -> Self {
        Self {
            gateway,
            renderer: Box::new(renderer),
        }
    }
}

/// What is currently shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screen {
    pub route: Option<Route>,
    pub markup: String,
    pub renders: usize,
}

#[derive(Default)]
struct NotesState {
    notes: BTreeMap<NoteId, Note>,
    tags: BTreeMap<String, BTreeSet<NoteId>>,
    notebooks: BTreeMap<NoteId, String>,
}

struct Shared<S: RealtimeStore> {
    ctx: AppContext<S>,
    screen: RefCell<Screen>,
    notes: RefCell<NotesState>,
}

impl<S: RealtimeStore + 'static> Shared<S> {
    fn show(&self, view: &View) -> Result<()> {
        let markup = self.ctx.renderer.render(view)?;
        let mut screen = self.screen.borrow_mut();
        screen.markup = markup;
        screen.renders += 1;
        Ok(())
    }

    /// Re-render from a subscription callback, where there is no caller to
    /// hand an error to.
    fn refresh(&self, view: View) {
        if let Err(err) = self.show(&view) {
            tracing::warn!(template = view.template_name(), error = %err, "Render failed");
        }
    }

    fn notes_view(&self) -> View {
        let state = self.notes.borrow();
        View::Notes(NotesView::build(
            self.ctx.gateway.session(),
            &state.notes,
            &state.tags,
            &state.notebooks,
            Utc::now(),
        ))
    }
}

/// Routes locations to views. Every navigation detaches the previous view's
/// subscriptions before anything new is rendered.
pub struct ViewController<S: RealtimeStore> {
    shared: Rc<Shared<S>>,
}

impl<S: RealtimeStore + 'static> ViewController<S> {
    pub fn new(ctx: AppContext<S>) -> Self {
        Self {
            shared: Rc::new(Shared {
                ctx,
                screen: RefCell::new(Screen::default()),
                notes: RefCell::new(NotesState::default()),
            }),
        }
    }

    pub fn gateway(&self) -> &Gateway<S> {
        &self.shared.ctx.gateway
    }

    pub fn screen(&self) -> Screen {
        self.shared.screen.borrow().clone()
    }

    pub fn markup(&self) -> String {
        self.shared.screen.borrow().markup.clone()
    }

    /// Show `location`. Returns the route actually shown: `/notes` without a
    /// session lands on Home instead.
    pub fn navigate(&self, location: &str) -> Result<Route> {
        let gateway = &self.shared.ctx.gateway;
        gateway.unload();
        *self.shared.notes.borrow_mut() = NotesState::default();

        let mut route = Route::parse(location);
        if route.requires_session() && !gateway.is_authenticated() {
            tracing::info!(location, "Not signed in, redirecting home");
            route = Route::Home;
        }
        self.shared.screen.borrow_mut().route = Some(route.clone());
        tracing::debug!(route = %route, "Navigating");

        let session = gateway.session();
        match &route {
            Route::Home => self.shared.show(&View::Home(HomeView { session }))?,
            Route::NotFound(location) => self.shared.show(&View::NotFound(NotFoundView {
                session,
                location: location.clone(),
            }))?,
            Route::Profile(user_id) => {
                self.shared
                    .show(&View::Profile(ProfileView::loading(session, user_id)))?;
                self.watch_profile(user_id)?;
            }
            Route::Notes => {
                self.shared.show(&self.shared.notes_view())?;
                self.watch_notes()?;
            }
        }
        Ok(route)
    }

    fn watch_profile(&self, user_id: &str) -> Result<()> {
        let weak = Rc::downgrade(&self.shared);
        let shown = user_id.to_string();
        self.shared.ctx.gateway.get_user_info(user_id, move |result| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match result {
                Ok(record) => shared.refresh(View::Profile(ProfileView::from_record(
                    shared.ctx.gateway.session(),
                    &shown,
                    record.as_ref(),
                ))),
                Err(err) => tracing::warn!(user_id = %shown, error = %err, "Unreadable user record"),
            }
        })?;
        Ok(())
    }

    fn watch_notes(&self) -> Result<()> {
        let gateway = &self.shared.ctx.gateway;

        let weak = Rc::downgrade(&self.shared);
        gateway.on_note(move |note_id, note| {
            with_shared(&weak, |shared| {
                shared.notes.borrow_mut().notes.insert(note_id, note);
            })
        })?;

        let weak = Rc::downgrade(&self.shared);
        gateway.on_tags(move |tags| {
            with_shared(&weak, |shared| shared.notes.borrow_mut().tags = tags)
        })?;

        let weak = Rc::downgrade(&self.shared);
        gateway.on_notebooks(move |notebooks| {
            with_shared(&weak, |shared| {
                shared.notes.borrow_mut().notebooks = notebooks
            })
        })?;
        Ok(())
    }
}

/// Apply `update` to the notes state, then re-render the notes view.
fn with_shared<S: RealtimeStore + 'static>(weak: &Weak<Shared<S>>, update: impl FnOnce(&Shared<S>)) {
    if let Some(shared) = weak.upgrade() {
        update(&shared);
        let view = shared.notes_view();
        shared.refresh(view);
    }
}
