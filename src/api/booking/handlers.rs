use actix_web::{
    get, post, put,
    web::{scope, Data, Path, Query, ServiceConfig},
    HttpRequest, HttpResponse,
};
use actix_web_validator::Json;

use crate::api::authenticate;
use crate::booking::BookingService;
use crate::domain::{JobId, UserId};
use crate::error::BookingError;

use super::dto::{
    AcceptJobRequest, CreateJobRequest, DistanceFeedRequest, HistoryQuery, JobListResponse,
    JobResponse, ListJobsQuery, MessageResponse, UpdateJobRequest,
};

#[post("")]
async fn create_job(
    service: Data<BookingService>,
    req: HttpRequest,
    body: Json<CreateJobRequest>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service
        .create_job(&acting, body.into_inner().into_details())
        .await?;
    Ok(HttpResponse::Created().json(JobResponse {
        message: "Booking created successfully".to_string(),
        job,
    }))
}

#[get("")]
async fn list_jobs(
    service: Data<BookingService>,
    req: HttpRequest,
    query: Query<ListJobsQuery>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let query = query.into_inner();
    let jobs = match query.user_id {
        Some(user_id) => service.list_jobs_for_user(&acting, UserId(user_id)).await?,
        None => service.list_all_jobs(&acting, query.into_filter()?).await?,
    };
    Ok(HttpResponse::Ok().json(JobListResponse {
        message: "Jobs retrieved successfully".to_string(),
        count: jobs.len(),
        jobs,
    }))
}

#[get("/history")]
async fn job_history(
    service: Data<BookingService>,
    req: HttpRequest,
    query: Query<HistoryQuery>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let jobs = service
        .job_history_for_user(&acting, UserId(query.user_id), query.page.unwrap_or(1))
        .await?;
    Ok(HttpResponse::Ok().json(JobListResponse {
        message: "Job history retrieved successfully".to_string(),
        count: jobs.len(),
        jobs,
    }))
}

#[get("/potential")]
async fn potential_jobs(
    service: Data<BookingService>,
    req: HttpRequest,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let jobs = service.potential_jobs(&acting).await?;
    Ok(HttpResponse::Ok().json(JobListResponse {
        message: "Potential jobs retrieved successfully".to_string(),
        count: jobs.len(),
        jobs,
    }))
}

#[post("/accept")]
async fn accept_job(
    service: Data<BookingService>,
    req: HttpRequest,
    body: Json<AcceptJobRequest>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service.accept_job(&acting, JobId(body.job_id)).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Job accepted successfully".to_string(),
        job,
    }))
}

#[post("/distance-feed")]
async fn distance_feed(
    service: Data<BookingService>,
    req: HttpRequest,
    body: Json<DistanceFeedRequest>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    service
        .apply_distance_feed(&acting, body.into_inner().into_feed())
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Record updated".to_string(),
    }))
}

#[get("/{id}")]
async fn get_job(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service.get_job(&acting, JobId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Booking retrieved successfully".to_string(),
        job,
    }))
}

#[put("/{id}")]
async fn update_job(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
    body: Json<UpdateJobRequest>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let update = body.into_inner().into_update()?;
    let job = service
        .update_job(&acting, JobId(path.into_inner()), update)
        .await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Booking updated successfully".to_string(),
        job,
    }))
}

#[post("/{id}/accept")]
async fn accept_job_with_id(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service
        .accept_job_with_id(&acting, JobId(path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Job accepted successfully".to_string(),
        job,
    }))
}

#[post("/{id}/decline")]
async fn decline_job(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    service.decline_job(&acting, JobId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Offer declined".to_string(),
    }))
}

#[post("/{id}/start")]
async fn start_job(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service.start_job(&acting, JobId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Job started successfully".to_string(),
        job,
    }))
}

#[post("/{id}/end")]
async fn end_job(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service.end_job(&acting, JobId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Job ended successfully".to_string(),
        job,
    }))
}

#[post("/{id}/no-show")]
async fn record_no_show(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service
        .record_no_show(&acting, JobId(path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Customer no-show recorded".to_string(),
        job,
    }))
}

#[post("/{id}/cancel")]
async fn cancel_job(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service.cancel_job(&acting, JobId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Booking cancelled successfully".to_string(),
        job,
    }))
}

#[post("/{id}/reopen")]
async fn reopen_job(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service.reopen_job(&acting, JobId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Booking reopened successfully".to_string(),
        job,
    }))
}

#[post("/{id}/resend-notifications")]
async fn resend_notifications(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service
        .resend_notifications(&acting, JobId(path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Offers resent".to_string(),
        job,
    }))
}

#[post("/{id}/resend-sms")]
async fn resend_sms(
    service: Data<BookingService>,
    req: HttpRequest,
    path: Path<i64>,
) -> Result<HttpResponse, BookingError> {
    let acting = authenticate(&service, &req).await?;
    let job = service
        .resend_sms_notifications(&acting, JobId(path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "SMS offers resent".to_string(),
        job,
    }))
}

/// Registers every booking route under `/api/jobs`. Literal paths go in
/// before the `{id}` matchers; actix tries routes in registration order.
pub fn booking_config(config: &mut ServiceConfig) {
    config.service(
        scope("/api/jobs")
            .service(create_job)
            .service(list_jobs)
            .service(job_history)
            .service(potential_jobs)
            .service(accept_job)
            .service(distance_feed)
            .service(get_job)
            .service(update_job)
            .service(accept_job_with_id)
            .service(decline_job)
            .service(start_job)
            .service(end_job)
            .service(record_no_show)
            .service(cancel_job)
            .service(reopen_job)
            .service(resend_notifications)
            .service(resend_sms),
    );
}
