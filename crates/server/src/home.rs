use axum::extract::{Extension, State};
use serde::Serialize;
use tera::Context;

use crate::app::AppState;
use crate::pages::{render, PageResult};
use crate::session::PortalSession;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tool {
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub url: &'static str,
    pub color: &'static str,
}

pub fn tools() -> Vec<Tool> {
    vec![
        Tool {
            title: "Управление сделками",
            description: "Просмотр и создание сделок Bitrix24",
            icon: "📋",
            url: "/deals/",
            color: "#28a745",
        },
        Tool {
            title: "QR-коды товаров",
            description: "Генерация QR-кодов для товаров",
            icon: "📱",
            url: "/qr/",
            color: "#007bff",
        },
        Tool {
            title: "Сотрудники",
            description: "Иерархия руководителей и исходящие звонки за сутки",
            icon: "👥",
            url: "/employees/",
            color: "#6f42c1",
        },
        Tool {
            title: "Карта компаний",
            description: "Адреса компаний на Яндекс.Картах",
            icon: "🗺️",
            url: "/map/",
            color: "#fd7e14",
        },
        Tool {
            title: "Контакты",
            description: "Импорт и экспорт контактов в CSV и XLSX",
            icon: "📇",
            url: "/contacts/",
            color: "#17a2b8",
        },
    ]
}

pub async fn index(
    State(state): State<AppState>,
    Extension(session): Extension<PortalSession>,
) -> PageResult {
    let mut context = Context::new();
    context.insert("apps", &tools());
    context.insert("portal_domain", &session.credentials.domain);
    render(&state.templates, "home/index.html", &context)
}
