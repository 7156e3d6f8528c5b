//! Driver Boundary
//!
//! The core neither listens to a real DOM nor patches one. This module holds
//! the two contracts it relies on instead:
//!
//! - A [`DomSource`] turns `(selector, event)` pairs into event signals.
//!   [`VirtualDom`] is an in-memory implementation fed by
//!   [`VirtualDom::dispatch`].
//! - A [`Renderer`] consumes complete [`VNode`] trees from the view sink.
//!
//! [`run`] connects a root component to both.

mod dom;
mod render;
mod view;

pub use dom::{DomEvent, DomSource, VirtualDom};
pub use render::{FrameRenderer, RecordingRenderer, Renderer};
pub use view::VNode;

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::component::{Component, Instance, Sources};
use crate::error::DriverError;
use crate::reactive::{Runtime, Subscription};

/// A running root component.
pub struct App<R> {
    instance: Instance,
    renderer: Rc<RefCell<R>>,
    subscription: Subscription,
}

impl<R> App<R> {
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn renderer(&self) -> Ref<'_, R> {
        self.renderer.borrow()
    }

    /// Stop rendering and release the component's graph.
    pub fn dispose(self) {
        self.subscription.unsubscribe();
        self.instance.dispose();
    }
}

impl<R> fmt::Debug for App<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("instance", &self.instance)
            .field("subscription", &self.subscription)
            .finish()
    }
}

/// Invoke `component` as the root and render its first sink.
///
/// The renderer receives the current view right away, if there is one, and
/// then every view the component emits. A failing render aborts the pass
/// that produced the view and is returned from the corresponding `emit`.
pub fn run<P, R>(
    rt: &Runtime,
    component: &Component<P>,
    props: &P,
    sources: &Sources,
    renderer: R,
) -> Result<App<R>, DriverError>
where
    P: 'static,
    R: Renderer + 'static,
{
    if component.keys().next().is_none() {
        return Err(DriverError::MissingView {
            component: component.name().to_owned(),
        });
    }

    let instance = component.invoke(rt, props, sources)?;
    let view = match instance.view::<VNode>() {
        Ok(view) => view,
        Err(err) => {
            instance.dispose();
            return Err(err.into());
        }
    };

    let renderer = Rc::new(RefCell::new(renderer));
    let target = renderer.clone();
    let subscription = view.try_observe(move |tree| {
        target.borrow_mut().render(tree)?;
        Ok(())
    })?;

    debug!(component = component.name(), "app started");
    Ok(App {
        instance,
        renderer,
        subscription,
    })
}
