//! Typed parameters for async functions.
//!
//! Any async function whose arguments all implement [`FromParam`] can be used
//! as a checker, handler, hook or provider. Each argument declares itself at
//! registration and converts its resolved value back at call time.

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use brass_core::{Bot, BoxedBot, BoxedEvent, Event, Message};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{HandlerError, SolveError, SolveResult};
use crate::matcher::MatcherHandle;
use crate::state::State;

use super::dependent::Declared;
use super::param::{Annotation, ArgKind, ParamDecl, Resolved, ResolvedArgs, TypeTag};
use super::provider::{DependsOn, Injectable};

/// A type that can be used as a parameter of a dependent function.
pub trait FromParam: Sized + Send + 'static {
    /// Declares the parameter at `position`.
    fn declare(position: usize) -> ParamDecl;

    /// Converts the resolved value.
    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self>;
}

fn mismatch<T>(param: &str) -> SolveError {
    SolveError::TypeMismatch {
        param: param.to_string(),
        expected: type_name::<T>(),
    }
}

impl FromParam for BoxedBot {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("bot#{position}")).annotated(Annotation::Bot(None))
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        match value {
            Resolved::Bot(bot) => Ok(bot),
            _ => Err(mismatch::<Self>(param)),
        }
    }
}

impl FromParam for BoxedEvent {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("event#{position}")).annotated(Annotation::Event(None))
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        match value {
            Resolved::Event(event) => Ok(event),
            _ => Err(mismatch::<Self>(param)),
        }
    }
}

impl FromParam for State {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("state#{position}")).annotated(Annotation::State)
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        match value {
            Resolved::State(state) => Ok(state),
            _ => Err(mismatch::<Self>(param)),
        }
    }
}

impl FromParam for MatcherHandle {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("matcher#{position}")).annotated(Annotation::Matcher)
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        match value {
            Resolved::Matcher(matcher) => Ok(matcher),
            _ => Err(mismatch::<Self>(param)),
        }
    }
}

/// A concrete event type.
///
/// A dependent taking `EventContext<E>` is skipped with a type mismatch for
/// every event that is not an `E`.
///
/// ```rust,ignore
/// async fn on_poke(event: EventContext<PokeNotice>) {
///     println!("poked by {}", event.sender);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct EventContext<E: Event + Clone> {
    data: E,
}

impl<E: Event + Clone> EventContext<E> {
    /// Returns the event as a trait object.
    pub fn as_event(&self) -> &dyn Event {
        &self.data
    }

    /// Unwraps the event.
    pub fn into_inner(self) -> E {
        self.data
    }
}

impl<E: Event + Clone> Deref for EventContext<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.data
    }
}

impl<E: Event + Clone> FromParam for EventContext<E> {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("event#{position}"))
            .annotated(Annotation::Event(Some(TypeTag::of::<E>())))
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        match value {
            Resolved::Event(event) => event
                .downcast_ref::<E>()
                .cloned()
                .map(|data| Self { data })
                .ok_or_else(|| mismatch::<E>(param)),
            _ => Err(mismatch::<E>(param)),
        }
    }
}

/// A concrete bot type.
pub struct BotContext<B>(pub Arc<B>);

impl<B> Deref for BotContext<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.0
    }
}

impl<B> Clone for BotContext<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: Bot> FromParam for BotContext<B> {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("bot#{position}"))
            .annotated(Annotation::Bot(Some(TypeTag::of::<B>())))
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        match value {
            Resolved::Bot(bot) => bot
                .as_any()
                .downcast::<B>()
                .map(Self)
                .map_err(|_| mismatch::<B>(param)),
            _ => Err(mismatch::<B>(param)),
        }
    }
}

/// The output of the sub-dependency `D`.
pub struct Depends<D: Injectable>(pub Arc<D::Output>);

impl<D: Injectable> Deref for Depends<D> {
    type Target = D::Output;

    fn deref(&self) -> &D::Output {
        &self.0
    }
}

impl<D: Injectable> FromParam for Depends<D> {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("depends#{position}")).depends(DependsOn::of::<D>())
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        match value {
            Resolved::Provided(provided) => provided
                .downcast::<D::Output>()
                .map(Self)
                .ok_or_else(|| mismatch::<D::Output>(param)),
            _ => Err(mismatch::<D::Output>(param)),
        }
    }
}

/// Like [`Depends`], but evaluated afresh on every use.
pub struct Fresh<D: Injectable>(pub Arc<D::Output>);

impl<D: Injectable> Deref for Fresh<D> {
    type Target = D::Output;

    fn deref(&self) -> &D::Output {
        &self.0
    }
}

impl<D: Injectable> FromParam for Fresh<D> {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("fresh#{position}")).depends(DependsOn::of::<D>().no_cache())
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        Depends::<D>::from_resolved(param, value).map(|Depends(value)| Self(value))
    }
}

/// The fault of the matcher run that just ended, for run postprocessors.
#[derive(Debug, Clone)]
pub struct Exception(pub Option<HandlerError>);

impl FromParam for Exception {
    fn declare(position: usize) -> ParamDecl {
        ParamDecl::named(format!("exception#{position}")).annotated(Annotation::Exception)
    }

    fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
        match value {
            Resolved::Exception(exception) => Ok(Self(exception)),
            _ => Err(mismatch::<Self>(param)),
        }
    }
}

/// Names a matcher slot at the type level.
///
/// ```rust,ignore
/// struct City;
///
/// impl ArgKey for City {
///     const KEY: &'static str = "city";
/// }
///
/// on_command("weather")
///     .got("city", "Which city?", |city: ArgPlainText<City>| async move {
///         format!("Sunny in {}", city.as_deref().unwrap_or("nowhere"))
///     });
/// ```
pub trait ArgKey: 'static {
    /// The slot key.
    const KEY: &'static str;
}

macro_rules! slot_extractor {
    ($(#[$doc:meta])* $name:ident, $value:ty, $kind:expr, $convert:expr) => {
        $(#[$doc])*
        pub struct $name<K> {
            value: Option<$value>,
            _key: PhantomData<fn() -> K>,
        }

        impl<K: ArgKey> $name<K> {
            /// Returns the slot key.
            pub fn key(&self) -> &'static str {
                K::KEY
            }

            /// Unwraps the slot value.
            pub fn into_inner(self) -> Option<$value> {
                self.value
            }
        }

        impl<K> Deref for $name<K> {
            type Target = Option<$value>;

            fn deref(&self) -> &Option<$value> {
                &self.value
            }
        }

        impl<K: ArgKey> fmt::Debug for $name<K> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("key", &K::KEY)
                    .field("value", &self.value)
                    .finish()
            }
        }

        impl<K: ArgKey> FromParam for $name<K> {
            fn declare(position: usize) -> ParamDecl {
                ParamDecl::named(format!("{}#{position}", K::KEY)).arg_key(Some(K::KEY), $kind)
            }

            fn from_resolved(param: &str, value: Resolved) -> SolveResult<Self> {
                let convert: fn(Resolved) -> Option<Option<$value>> = $convert;
                convert(value)
                    .map(|value| Self {
                        value,
                        _key: PhantomData,
                    })
                    .ok_or_else(|| mismatch::<$value>(param))
            }
        }
    };
}

fn slot_text(value: Resolved) -> Option<Option<String>> {
    match value {
        Resolved::Value(Value::String(text)) => Some(Some(text)),
        Resolved::Value(Value::Null) => Some(None),
        _ => None,
    }
}

slot_extractor!(
    /// The slot `K` as stored, `None` while it is empty.
    Arg,
    Message,
    ArgKind::Message,
    |value| match value {
        Resolved::Message(message) => Some(message),
        _ => None,
    }
);

slot_extractor!(
    /// The slot `K` rendered to a string.
    ArgStr,
    String,
    ArgKind::Str,
    slot_text
);

slot_extractor!(
    /// Only the text segments of the slot `K`.
    ArgPlainText,
    String,
    ArgKind::PlainText,
    slot_text
);

/// Conversion from an async function into a [`Declared`] dependent.
///
/// Implemented for functions of up to eight [`FromParam`] arguments.
pub trait IntoDeclared<T, R>: Clone + Send + Sync + 'static {
    /// Performs the conversion.
    fn into_declared(self) -> Declared<R>;
}

macro_rules! impl_into_declared {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, R, $($ty,)*> IntoDeclared<($($ty,)*), R> for F
        where
            F: Fn($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Send + 'static,
            $($ty: FromParam,)*
        {
            fn into_declared(self) -> Declared<R> {
                let mut position = 0usize;
                let decls = vec![$({
                    let decl = $ty::declare(position);
                    position += 1;
                    decl
                }),*];

                Declared::from_parts(
                    type_name::<F>().to_string(),
                    decls,
                    Arc::new(move |args: ResolvedArgs| -> BoxFuture<'static, SolveResult<R>> {
                        let f = self.clone();
                        Box::pin(async move {
                            let mut values = args.into_iter();
                            $(
                                let (param, value) = values
                                    .next()
                                    .ok_or_else(|| SolveError::fault("argument count mismatch"))?;
                                let $ty = $ty::from_resolved(&param, value)?;
                            )*
                            Ok(f($($ty,)*).await)
                        })
                    }),
                )
            }
        }
    };
}

impl_into_declared!();
impl_into_declared!(T1);
impl_into_declared!(T1, T2);
impl_into_declared!(T1, T2, T3);
impl_into_declared!(T1, T2, T3, T4);
impl_into_declared!(T1, T2, T3, T4, T5);
impl_into_declared!(T1, T2, T3, T4, T5, T6);
impl_into_declared!(T1, T2, T3, T4, T5, T6, T7);
impl_into_declared!(T1, T2, T3, T4, T5, T6, T7, T8);
